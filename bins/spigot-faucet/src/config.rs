//! Faucet configuration loaded from environment variables.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use axum::http::HeaderName;
use spigot_core::constants::MAX_INTERVAL;
use spigot_core::{Address, Amount, Network, PayoutPolicy};
use spigot_rpc::WalletRpcConfig;

#[derive(Clone, Debug)]
pub struct Config {
    /// Address to bind the HTTP server.
    pub bind_addr: SocketAddr,
    /// Network recipient addresses must belong to.
    pub network: Network,
    /// Wallet JSON-RPC connection.
    pub wallet: WalletRpcConfig,
    /// Wallet account payouts are sent from.
    pub wallet_account: String,
    /// Default payout when a request names no amount.
    pub amount: Amount,
    /// Cooldown between payouts per client.
    pub cooldown: Duration,
    /// Secret that skips the cooldown.
    pub override_token: Option<String>,
    /// Interval of the background balance refresh.
    pub balance_refresh: Duration,
    /// How long a request may wait before its payout is abandoned.
    pub request_timeout: Duration,
    /// Header carrying the client IP when behind a trusted proxy.
    pub real_ip_header: HeaderName,
    /// Peers allowed to set `real_ip_header`.
    pub trusted_proxies: Vec<IpAddr>,
    /// Shown on the status page so users can return funds.
    pub donation_address: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = get("FAUCET_BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8001".to_string())
            .parse()
            .context("FAUCET_BIND_ADDR must be an ip:port socket address")?;

        let network: Network = get("FAUCET_NETWORK")
            .unwrap_or_else(|| "testnet".to_string())
            .parse()
            .context("FAUCET_NETWORK must be mainnet, testnet or regtest")?;

        let wallet = WalletRpcConfig {
            url: get("FAUCET_WALLET_RPC").unwrap_or_else(|| "https://127.0.0.1:19110".to_string()),
            user: get("FAUCET_WALLET_USER").context("FAUCET_WALLET_USER is required")?,
            password: get("FAUCET_WALLET_PASSWORD").context("FAUCET_WALLET_PASSWORD is required")?,
            ca_cert: get("FAUCET_WALLET_CERT").map(PathBuf::from),
            timeout: secs(get("FAUCET_WALLET_TIMEOUT_SECS"), 30, "FAUCET_WALLET_TIMEOUT_SECS")?,
        };
        ensure!(!wallet.timeout.is_zero(), "FAUCET_WALLET_TIMEOUT_SECS must be positive");

        let wallet_account = get("FAUCET_WALLET_ACCOUNT").unwrap_or_else(|| "default".to_string());

        let amount_text = get("FAUCET_AMOUNT").unwrap_or_else(|| "2".to_string());
        let amount = Amount::parse_coins(&amount_text)
            .with_context(|| format!("FAUCET_AMOUNT {amount_text:?} is not a coin amount"))?;
        ensure!(!amount.is_zero(), "FAUCET_AMOUNT must be greater than 0");

        let cooldown = secs(get("FAUCET_COOLDOWN_SECS"), 86_400, "FAUCET_COOLDOWN_SECS")?;
        let override_token = get("FAUCET_OVERRIDE_TOKEN");

        let balance_refresh = secs(
            get("FAUCET_BALANCE_REFRESH_SECS"),
            300,
            "FAUCET_BALANCE_REFRESH_SECS",
        )?;
        ensure!(!balance_refresh.is_zero(), "FAUCET_BALANCE_REFRESH_SECS must be positive");

        let request_timeout = secs(
            get("FAUCET_REQUEST_TIMEOUT_SECS"),
            60,
            "FAUCET_REQUEST_TIMEOUT_SECS",
        )?;
        ensure!(!request_timeout.is_zero(), "FAUCET_REQUEST_TIMEOUT_SECS must be positive");

        let header = get("FAUCET_REAL_IP_HEADER").unwrap_or_else(|| "x-real-ip".to_string());
        let real_ip_header = HeaderName::from_str(header.trim())
            .with_context(|| format!("FAUCET_REAL_IP_HEADER {header:?} is not a header name"))?;

        let trusted_proxies = match get("FAUCET_TRUSTED_PROXIES") {
            Some(list) => parse_ip_list(&list).context("FAUCET_TRUSTED_PROXIES")?,
            None => Vec::new(),
        };

        let donation_address = match get("FAUCET_DONATION_ADDRESS") {
            Some(text) => {
                let address = Address::decode(&text)
                    .with_context(|| format!("FAUCET_DONATION_ADDRESS {text:?} is invalid"))?;
                ensure!(
                    address.network() == network,
                    "FAUCET_DONATION_ADDRESS is not a {network} address"
                );
                Some(address.encode())
            }
            None => None,
        };

        Ok(Config {
            bind_addr,
            network,
            wallet,
            wallet_account,
            amount,
            cooldown,
            override_token,
            balance_refresh,
            request_timeout,
            real_ip_header,
            trusted_proxies,
            donation_address,
        })
    }

    pub fn payout_policy(&self) -> PayoutPolicy {
        let policy = PayoutPolicy::new(self.amount, self.cooldown, self.network);
        match &self.override_token {
            Some(token) => policy.with_override_token(token.clone()),
            None => policy,
        }
    }
}

fn secs(value: Option<String>, default: u64, key: &str) -> Result<Duration> {
    let secs = match value {
        Some(v) => v
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{key} must be a non-negative integer"))?,
        None => default,
    };
    let duration = Duration::from_secs(secs);
    ensure!(
        duration <= MAX_INTERVAL,
        "{key} must be at most {} seconds",
        MAX_INTERVAL.as_secs()
    );
    Ok(duration)
}

fn parse_ip_list(list: &str) -> Result<Vec<IpAddr>> {
    let mut ips = Vec::new();
    for entry in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match entry.parse::<IpAddr>() {
            Ok(ip) => ips.push(ip.to_canonical()),
            Err(_) => bail!("{entry:?} is not an IP address"),
        }
    }
    Ok(ips)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use spigot_core::testing::{address_for, testnet_address};

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let mut env: HashMap<String, String> = HashMap::from([
            ("FAUCET_WALLET_USER".to_string(), "faucet".to_string()),
            ("FAUCET_WALLET_PASSWORD".to_string(), "hunter2".to_string()),
        ]);
        for (k, v) in pairs {
            env.insert(k.to_string(), v.to_string());
        }
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8001".parse().unwrap());
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.wallet.url, "https://127.0.0.1:19110");
        assert_eq!(config.wallet.timeout, Duration::from_secs(30));
        assert!(config.wallet.ca_cert.is_none());
        assert_eq!(config.wallet_account, "default");
        assert_eq!(config.amount, Amount::from_units(200_000_000));
        assert_eq!(config.cooldown, Duration::from_secs(86_400));
        assert_eq!(config.balance_refresh, Duration::from_secs(300));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.real_ip_header.as_str(), "x-real-ip");
        assert!(config.trusted_proxies.is_empty());
        assert!(config.override_token.is_none());
        assert!(config.donation_address.is_none());
    }

    #[test]
    fn credentials_are_required() {
        let err = Config::from_lookup(|_| None).unwrap_err();
        assert!(err.to_string().contains("FAUCET_WALLET_USER"));
    }

    #[test]
    fn overrides() {
        let donation = testnet_address(9);
        let config = load(&[
            ("FAUCET_BIND_ADDR", "127.0.0.1:9000"),
            ("FAUCET_AMOUNT", "0.5"),
            ("FAUCET_COOLDOWN_SECS", "60"),
            ("FAUCET_OVERRIDE_TOKEN", "s3cret"),
            ("FAUCET_REAL_IP_HEADER", "X-Forwarded-For"),
            ("FAUCET_TRUSTED_PROXIES", "10.0.0.1, ::1"),
            ("FAUCET_WALLET_CERT", "/etc/spigot/rpc.cert"),
            ("FAUCET_DONATION_ADDRESS", donation.as_str()),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.amount, Amount::from_units(50_000_000));
        assert_eq!(config.cooldown, Duration::from_secs(60));
        assert_eq!(config.override_token.as_deref(), Some("s3cret"));
        assert_eq!(config.real_ip_header.as_str(), "x-forwarded-for");
        assert_eq!(
            config.trusted_proxies,
            vec!["10.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]
        );
        assert_eq!(config.wallet.ca_cert, Some(PathBuf::from("/etc/spigot/rpc.cert")));
        assert_eq!(config.donation_address, Some(donation));
    }

    #[test]
    fn empty_values_are_unset() {
        let config = load(&[("FAUCET_OVERRIDE_TOKEN", ""), ("FAUCET_AMOUNT", " ")]).unwrap();
        assert!(config.override_token.is_none());
        assert_eq!(config.amount, Amount::from_units(200_000_000));
    }

    #[test]
    fn rejects_bad_values() {
        for pair in [
            ("FAUCET_AMOUNT", "0"),
            ("FAUCET_AMOUNT", "two"),
            ("FAUCET_NETWORK", "moonnet"),
            ("FAUCET_COOLDOWN_SECS", "-5"),
            ("FAUCET_BALANCE_REFRESH_SECS", "0"),
            ("FAUCET_REQUEST_TIMEOUT_SECS", "0"),
            ("FAUCET_TRUSTED_PROXIES", "10.0.0.1,proxy.local"),
            ("FAUCET_BIND_ADDR", "localhost"),
            ("FAUCET_REQUEST_TIMEOUT_SECS", "18446744073709551615"),
            ("FAUCET_BALANCE_REFRESH_SECS", "18446744073709551615"),
            ("FAUCET_COOLDOWN_SECS", "31536001"),
            ("FAUCET_WALLET_TIMEOUT_SECS", "99999999999"),
        ] {
            assert!(load(&[pair]).is_err(), "{pair:?} accepted");
        }
    }

    #[test]
    fn longest_interval_is_accepted() {
        let max = MAX_INTERVAL.as_secs().to_string();
        let config = load(&[
            ("FAUCET_REQUEST_TIMEOUT_SECS", max.as_str()),
            ("FAUCET_COOLDOWN_SECS", max.as_str()),
        ])
        .unwrap();
        assert_eq!(config.request_timeout, MAX_INTERVAL);
        assert_eq!(config.cooldown, MAX_INTERVAL);
    }

    #[test]
    fn policy_carries_payout_settings() {
        let config =
            load(&[("FAUCET_OVERRIDE_TOKEN", "s3cret"), ("FAUCET_NETWORK", "regtest")]).unwrap();
        let policy = config.payout_policy();
        assert_eq!(policy.default_amount, config.amount);
        assert_eq!(policy.cooldown, config.cooldown);
        assert_eq!(policy.network, Network::Regtest);
        assert_eq!(policy.override_token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn donation_address_must_match_network() {
        let mainnet = address_for(1, Network::Mainnet).encode();
        assert!(load(&[("FAUCET_DONATION_ADDRESS", mainnet.as_str())]).is_err());
        assert!(
            load(&[
                ("FAUCET_DONATION_ADDRESS", mainnet.as_str()),
                ("FAUCET_NETWORK", "mainnet"),
            ])
            .is_ok()
        );
    }
}
