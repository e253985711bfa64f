use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, fs};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub address: String,
    pub store: StoreConfig,
    pub fs: FsConfig,
    pub allowed_cors_origins: Vec<String>,
    /// Entries rendered per directory listing; `<= 0` lists everything.
    pub listing_limit: i64,
    /// Certificate and key to serve HTTPS with; plain HTTP when absent.
    pub tls: Option<TlsConfig>,
}

/// PEM files for the HTTPS listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

/// Connection settings for the S3-compatible backend.
#[derive(Clone)]
pub struct StoreConfig {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key.as_ref().map(|_| "<redacted>"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("path_style", &self.path_style)
            .finish()
    }
}

/// Immutable settings the filesystem adapter resolves paths with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsConfig {
    /// Prefix inside the bucket that all served content lives under.
    pub bucket_path: String,
    /// Object key served for any path nothing else matched.
    pub spa_file: Option<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Serve an S3 bucket as a static website")]
pub struct Args {
    /// S3 compatible server endpoint (overrides S3WWW_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Bucket name with static files (overrides S3WWW_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Bucket path to serve static files from (overrides S3WWW_BUCKET_PATH)
    #[arg(long)]
    pub bucket_path: Option<String>,

    /// Region used to sign requests (overrides S3WWW_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Access key (overrides S3WWW_ACCESS_KEY)
    #[arg(long)]
    pub access_key: Option<String>,

    /// Secret key (overrides S3WWW_SECRET_KEY)
    #[arg(long)]
    pub secret_key: Option<String>,

    /// File containing the access key (overrides S3WWW_ACCESS_KEY_FILE)
    #[arg(long)]
    pub access_key_file: Option<String>,

    /// File containing the secret key (overrides S3WWW_SECRET_KEY_FILE)
    #[arg(long)]
    pub secret_key_file: Option<String>,

    /// ADDRESS:PORT to bind to (overrides S3WWW_ADDRESS)
    #[arg(long)]
    pub address: Option<String>,

    /// Key served whenever a path doesn't exist, for single page applications
    /// (overrides S3WWW_SPA_FILE)
    #[arg(long)]
    pub spa_file: Option<String>,

    /// Comma separated origin patterns allowed for CORS, `*` wildcards
    /// accepted (overrides S3WWW_ALLOWED_CORS_ORIGINS)
    #[arg(long)]
    pub allowed_cors_origins: Option<String>,

    /// Use path-style bucket addressing (overrides S3WWW_PATH_STYLE)
    #[arg(long)]
    pub path_style: Option<bool>,

    /// Maximum entries in a directory listing, 0 for all
    /// (overrides S3WWW_LISTING_LIMIT)
    #[arg(long, allow_negative_numbers = true)]
    pub listing_limit: Option<i64>,

    /// Public TLS certificate in PEM format (overrides S3WWW_SSL_CERT)
    #[arg(long)]
    pub ssl_cert: Option<String>,

    /// Private TLS key in PEM format (overrides S3WWW_SSL_KEY)
    #[arg(long)]
    pub ssl_key: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |key| env::var(key).ok())
    }

    /// Merge parsed arguments with values looked up through `env`.
    pub fn resolve(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let pick = |arg: Option<String>, key: &str| arg.or_else(|| env(key));

        let bucket = pick(args.bucket, "S3WWW_BUCKET").unwrap_or_default();
        if bucket.trim().is_empty() {
            bail!("bucket name cannot be empty, please provide `--bucket mybucket`");
        }
        let endpoint = pick(args.endpoint, "S3WWW_ENDPOINT").unwrap_or_default();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            bail!("endpoint `{}` must be an http:// or https:// URL", endpoint);
        }

        let mut access_key = pick(args.access_key, "S3WWW_ACCESS_KEY");
        let mut secret_key = pick(args.secret_key, "S3WWW_SECRET_KEY");
        if let Some(path) = pick(args.access_key_file, "S3WWW_ACCESS_KEY_FILE") {
            access_key = Some(read_key_file(&path)?);
        }
        if let Some(path) = pick(args.secret_key_file, "S3WWW_SECRET_KEY_FILE") {
            secret_key = Some(read_key_file(&path)?);
        }
        let access_key = access_key.filter(|k| !k.is_empty());
        let secret_key = secret_key.filter(|k| !k.is_empty());

        let path_style = match args.path_style {
            Some(value) => value,
            None => env_bool(&env, "S3WWW_PATH_STYLE", true),
        };
        let listing_limit = match args.listing_limit {
            Some(value) => value,
            None => match env("S3WWW_LISTING_LIMIT") {
                Some(value) => value
                    .trim()
                    .parse::<i64>()
                    .with_context(|| format!("parsing S3WWW_LISTING_LIMIT value `{}`", value))?,
                None => 1000,
            },
        };

        let tls = match (
            pick(args.ssl_cert, "S3WWW_SSL_CERT").filter(|p| !p.trim().is_empty()),
            pick(args.ssl_key, "S3WWW_SSL_KEY").filter(|p| !p.trim().is_empty()),
        ) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path,
                key_path,
            }),
            (None, None) => None,
            _ => bail!("both `--ssl-cert` and `--ssl-key` are required to serve HTTPS"),
        };

        let allowed_cors_origins = pick(args.allowed_cors_origins, "S3WWW_ALLOWED_CORS_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            address: pick(args.address, "S3WWW_ADDRESS").unwrap_or_else(|| "127.0.0.1:8080".into()),
            store: StoreConfig {
                endpoint,
                region: pick(args.region, "S3WWW_REGION").unwrap_or_else(|| "us-east-1".into()),
                bucket,
                access_key,
                secret_key,
                path_style,
            },
            fs: FsConfig {
                bucket_path: pick(args.bucket_path, "S3WWW_BUCKET_PATH").unwrap_or_else(|| "/".into()),
                spa_file: pick(args.spa_file, "S3WWW_SPA_FILE").filter(|f| !f.trim().is_empty()),
            },
            allowed_cors_origins,
            listing_limit,
            tls,
        })
    }
}

fn read_key_file(path: &str) -> Result<String> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read key file `{}`", path))?;
    Ok(contents.trim().to_string())
}

/// Unparsable booleans fall back to `default` with a warning.
fn env_bool(env: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    let Some(value) = env(key) else {
        return default;
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => true,
        "0" | "f" | "false" | "no" | "off" => false,
        _ => {
            tracing::warn!("string of {:?} did not parse as bool for env var {}", value, key);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn args(argv: &[&str]) -> Args {
        let mut full = vec!["bucketfs-www"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn defaults_apply_when_only_required_values_given() {
        let env = env_of(&[
            ("S3WWW_BUCKET", "site"),
            ("S3WWW_ENDPOINT", "http://127.0.0.1:9000"),
        ]);
        let cfg = AppConfig::resolve(args(&[]), env).unwrap();

        assert_eq!(cfg.address, "127.0.0.1:8080");
        assert_eq!(cfg.store.region, "us-east-1");
        assert!(cfg.store.path_style);
        assert_eq!(cfg.fs.bucket_path, "/");
        assert_eq!(cfg.fs.spa_file, None);
        assert_eq!(cfg.listing_limit, 1000);
        assert!(cfg.allowed_cors_origins.is_empty());
    }

    #[test]
    fn cli_flags_override_environment() {
        let env = env_of(&[
            ("S3WWW_BUCKET", "from-env"),
            ("S3WWW_ENDPOINT", "http://env:9000"),
            ("S3WWW_SPA_FILE", "env.html"),
        ]);
        let cfg = AppConfig::resolve(
            args(&["--bucket", "from-cli", "--spa-file", "/app.html", "--listing-limit", "-1"]),
            env,
        )
        .unwrap();

        assert_eq!(cfg.store.bucket, "from-cli");
        assert_eq!(cfg.store.endpoint, "http://env:9000");
        assert_eq!(cfg.fs.spa_file.as_deref(), Some("/app.html"));
        assert_eq!(cfg.listing_limit, -1);
    }

    #[test]
    fn tls_needs_both_certificate_and_key() {
        let base = [("S3WWW_BUCKET", "site"), ("S3WWW_ENDPOINT", "http://x")];

        let cfg = AppConfig::resolve(args(&[]), env_of(&base)).unwrap();
        assert_eq!(cfg.tls, None);

        let mut with_both = base.to_vec();
        with_both.push(("S3WWW_SSL_CERT", "/etc/tls/cert.pem"));
        let cfg = AppConfig::resolve(
            args(&["--ssl-key", "/etc/tls/key.pem"]),
            env_of(&with_both),
        )
        .unwrap();
        assert_eq!(
            cfg.tls,
            Some(TlsConfig {
                cert_path: "/etc/tls/cert.pem".into(),
                key_path: "/etc/tls/key.pem".into(),
            })
        );

        let mut cert_only = base.to_vec();
        cert_only.push(("S3WWW_SSL_CERT", "/etc/tls/cert.pem"));
        assert!(AppConfig::resolve(args(&[]), env_of(&cert_only)).is_err());
    }

    #[test]
    fn blank_bucket_is_rejected() {
        let env = env_of(&[("S3WWW_BUCKET", "  "), ("S3WWW_ENDPOINT", "http://x")]);
        assert!(AppConfig::resolve(args(&[]), env).is_err());
    }

    #[test]
    fn bad_bool_falls_back_to_default() {
        let env = env_of(&[
            ("S3WWW_BUCKET", "site"),
            ("S3WWW_ENDPOINT", "https://s3.amazonaws.com"),
            ("S3WWW_PATH_STYLE", "maybe"),
        ]);
        let cfg = AppConfig::resolve(args(&[]), env).unwrap();
        assert!(cfg.store.path_style);
    }

    #[test]
    fn cors_origins_split_on_commas() {
        let env = env_of(&[
            ("S3WWW_BUCKET", "site"),
            ("S3WWW_ENDPOINT", "http://x"),
            ("S3WWW_ALLOWED_CORS_ORIGINS", "https://a.example, https://*.b.example,"),
        ]);
        let cfg = AppConfig::resolve(args(&[]), env).unwrap();
        assert_eq!(
            cfg.allowed_cors_origins,
            vec!["https://a.example", "https://*.b.example"]
        );
    }

    #[test]
    fn key_files_override_literal_keys() {
        let dir = env::temp_dir().join(format!("bucketfs-www-keys-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let access = dir.join("access");
        fs::write(&access, "  filekey\n").unwrap();

        let env = env_of(&[
            ("S3WWW_BUCKET", "site"),
            ("S3WWW_ENDPOINT", "http://x"),
            ("S3WWW_ACCESS_KEY", "literal"),
            ("S3WWW_ACCESS_KEY_FILE", access.to_str().unwrap()),
        ]);
        let cfg = AppConfig::resolve(args(&[]), env).unwrap();
        assert_eq!(cfg.store.access_key.as_deref(), Some("filekey"));

        let missing = env_of(&[
            ("S3WWW_BUCKET", "site"),
            ("S3WWW_ENDPOINT", "http://x"),
            ("S3WWW_SECRET_KEY_FILE", "/definitely/not/here"),
        ]);
        assert!(AppConfig::resolve(args(&[]), missing).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
