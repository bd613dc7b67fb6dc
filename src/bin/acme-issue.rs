//! acme-issue：互動式申請單一網域憑證。
//!
//! 印出挑戰內容，等待操作者公開後按下 Enter，再完成申請並寫出
//! `<domain>.crt` 與 `<domain>.key`。

use std::{
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use acme_issue::{
    challenge::{ChallengeMaterial, ChallengeType},
    config::ClientConfig,
    flow::{CertificateFlow, PendingValidation},
    provider::CaProvider,
    storage::FileStorage,
    transport::ReqwestTransport,
};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

/// 透過 ACME 申請 TLS 憑證
#[derive(Parser, Debug)]
#[command(name = "acme-issue")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 要申請的網域（萬用字元需搭配 dns）
    #[arg(short = 'd', long = "domain")]
    domain: String,

    /// CA：letsencrypt、letsencrypt-staging、zerossl 或目錄 URL
    #[arg(short = 'p', long = "provider", env = "ACME_ISSUE_PROVIDER")]
    provider: Option<CaProvider>,

    /// 驗證方式：webserver（http-01）或 dns（dns-01）
    #[arg(short = 'm', long = "method", default_value = "webserver")]
    method: ChallengeType,

    /// 帳戶聯絡信箱
    #[arg(short = 'e', long = "email", env = "ACME_ISSUE_EMAIL")]
    email: Option<String>,

    /// 帳戶儲存的身分命名空間
    #[arg(short = 'i', long = "identity", env = "ACME_ISSUE_IDENTITY")]
    identity: Option<String>,

    /// TOML 設定檔
    #[arg(short = 'c', long = "config", env = "ACME_ISSUE_CONFIG")]
    config: Option<PathBuf>,

    /// 輸出目錄
    #[arg(short = 'o', long = "out", default_value = ".")]
    out: PathBuf,

    /// 不等待確認，直接觸發驗證
    #[arg(short = 'y', long = "yes")]
    yes: bool,

    /// 輸出 debug 等級日誌
    #[arg(long = "verbose")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let config = load_config(&cli)?;
    let storage_path = config.resolved_storage_path();
    let storage = FileStorage::open(&storage_path)
        .with_context(|| format!("failed to open storage at {}", storage_path.display()))?;
    info!(path = %storage_path.display(), "using account storage");

    let flow = CertificateFlow::new(config, Arc::new(storage));
    let transport = ReqwestTransport::new().context("failed to build HTTP client")?;
    let pending = flow.begin(Box::new(transport), &cli.domain, cli.method)?;

    print_material(&pending);
    if !cli.yes {
        wait_for_confirmation()?;
    }

    let domain = pending.domain().to_string();
    let bundle = pending.complete()?;

    fs::create_dir_all(&cli.out)
        .with_context(|| format!("failed to create {}", cli.out.display()))?;
    let stem = domain.replace('*', "_wildcard");
    let cert_path = cli.out.join(format!("{}.crt", stem));
    let key_path = cli.out.join(format!("{}.key", stem));
    fs::write(&cert_path, &bundle.certificate_pem)
        .with_context(|| format!("failed to write {}", cert_path.display()))?;
    write_private(&key_path, bundle.private_key_pem.as_bytes())?;

    println!("certificate: {}", cert_path.display());
    println!("private key: {}", key_path.display());
    if let Some(not_after) = bundle.not_after() {
        println!("expires:     {}", not_after);
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(provider) = &cli.provider {
        config.provider = provider.clone();
    }
    if let Some(email) = &cli.email {
        config.contact_email = Some(email.clone());
    }
    if let Some(identity) = &cli.identity {
        config.identity = identity.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn print_material(pending: &PendingValidation) {
    println!();
    match pending.material() {
        ChallengeMaterial::Http01(http) => {
            println!("Serve the following content over plain HTTP:");
            println!("  URL:     http://{}{}", pending.domain(), http.path());
            println!("  Content: {}", http.key_authorization);
        }
        ChallengeMaterial::Dns01(dns) => {
            println!("Publish the following DNS TXT record:");
            println!("  Name:  {}", dns.record_name(pending.domain()));
            println!("  Value: {}", dns.value);
        }
    }
    println!();
}

fn wait_for_confirmation() -> Result<()> {
    print!("Press Enter once the challenge is published...");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
        .open(path)
        .and_then(|mut file| file.write_all(data))
        .with_context(|| format!("failed to write {}", path.display()))
}
