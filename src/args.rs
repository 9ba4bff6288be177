//! Command-line arguments for the `ldap-proxy` binary

use clap::Parser;
use std::path::PathBuf;

/// LDAP proxy: relays directory operations to the configured targets
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path (a default one is written if missing)
    #[arg(short, long, default_value = "ldap-proxy.toml", env = "LDAP_PROXY_CONFIG")]
    pub config: PathBuf,

    /// Validate the configuration, print the target table and exit
    #[arg(long)]
    pub check: bool,

    /// Connect to every target and read its root DSE
    #[arg(long)]
    pub probe: bool,

    /// Also write logs to this file
    #[arg(long, env = "LDAP_PROXY_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["ldap-proxy"]).unwrap();
        assert_eq!(args.config, PathBuf::from("ldap-proxy.toml"));
        assert!(!args.check);
        assert!(!args.probe);
        assert!(args.log_file.is_none());
    }

    #[test]
    fn test_flags() {
        let args =
            Args::try_parse_from(["ldap-proxy", "-c", "/etc/proxy.toml", "--check", "--probe"])
                .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/proxy.toml"));
        assert!(args.check);
        assert!(args.probe);
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(Args::try_parse_from(["ldap-proxy", "--listen", "389"]).is_err());
    }
}
