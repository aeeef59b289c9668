use anyhow::{anyhow, Result};
use clap::Parser;
use ip_speedtest::{
    country::DEFAULT_FLAG_CDN,
    prober::{DEFAULT_EXPECTED_BYTES, DEFAULT_PORT, DEFAULT_TEST_URL},
    Config, FallbackPolicy, FlagStyle, GeoConfig, InputError, OutputFormat, ProbeConfig, ProbeMode,
    RelayScheme, ReportConfig, SpeedTest,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Measure download speed through candidate IPs and rank the fastest
#[derive(Parser)]
#[command(name = "ip-speedtest")]
#[command(about = "Measure download speed through candidate IPs and rank the fastest")]
struct Cli {
    /// Input file with one `IP[:PORT]#LABEL` per line
    #[arg(short, long, default_value = ip_speedtest::DEFAULT_INPUT)]
    input: PathBuf,

    /// Report file
    #[arg(short, long, default_value = ip_speedtest::DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Report format (plain, markdown)
    #[arg(short, long, default_value = "plain")]
    format: String,

    /// Probe mode (direct, proxy)
    #[arg(short, long, default_value = "direct")]
    mode: String,

    /// Relay scheme in proxy mode (http, socks5)
    #[arg(long, default_value = "http")]
    proxy_scheme: String,

    /// Flag rendering (emoji, image, none)
    #[arg(long, default_value = "emoji")]
    flags: String,

    /// Flag image CDN used with `--flags image`
    #[arg(long, default_value = DEFAULT_FLAG_CDN)]
    flag_cdn: String,

    /// URL of the fixed-size test payload
    #[arg(long, default_value = DEFAULT_TEST_URL)]
    test_url: String,

    /// Size of the test payload in bytes
    #[arg(long, default_value_t = DEFAULT_EXPECTED_BYTES)]
    expected_bytes: u64,

    /// Retries after the first attempt
    #[arg(long, default_value = "2")]
    retries: u32,

    /// Timeout per attempt in seconds
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// Port for candidates without one
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// MaxMind City database consulted before online lookups
    #[arg(long)]
    mmdb: Option<PathBuf>,

    /// Number of endpoints probed at once
    #[arg(short = 'n', long, default_value = "1")]
    concurrency: usize,

    /// When to try the next geolocation provider (rate-limit, any)
    #[arg(long, default_value = "rate-limit")]
    fallback: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<InputError>() {
            Some(input_error) => eprintln!("{}", input_error),
            None => error!("speed test aborted: {:#}", e),
        }
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = build_config(cli)?;

    println!("Mode: {}, test URL: {}", config.probe.mode, config.probe.test_url);
    println!(
        "Retries: {}, timeout: {}s, concurrency: {}",
        config.probe.retries,
        config.probe.attempt_timeout.as_secs(),
        config.probe.concurrency
    );
    println!();

    let speed_test = SpeedTest::with_config(config)?;
    speed_test.run_file().await?;
    Ok(())
}

fn build_config(cli: Cli) -> Result<Config> {
    let probe = ProbeConfig::new()
        .with_mode(parse_mode(&cli.mode)?)
        .with_relay_scheme(parse_relay_scheme(&cli.proxy_scheme)?)
        .with_test_url(cli.test_url)
        .with_expected_bytes(cli.expected_bytes)
        .with_retries(cli.retries)
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_default_port(cli.port)
        .with_concurrency(cli.concurrency);

    let mut geo = GeoConfig::new()
        .with_fallback(parse_fallback(&cli.fallback)?)
        .with_flag_style(parse_flag_style(&cli.flags, &cli.flag_cdn)?);
    if let Some(path) = cli.mmdb {
        geo = geo.with_mmdb_path(path);
    }

    Ok(Config::new()
        .with_input(cli.input)
        .with_output(cli.output)
        .with_probe(probe)
        .with_geo(geo)
        .with_report(ReportConfig::new().with_format(parse_format(&cli.format)?)))
}

fn parse_mode(s: &str) -> Result<ProbeMode> {
    match s.to_lowercase().as_str() {
        "direct" => Ok(ProbeMode::DirectConnect),
        "proxy" => Ok(ProbeMode::ProxyRelay),
        _ => Err(anyhow!("Invalid mode: {}. Use: direct, proxy", s)),
    }
}

fn parse_relay_scheme(s: &str) -> Result<RelayScheme> {
    match s.to_lowercase().as_str() {
        "http" => Ok(RelayScheme::Http),
        "socks5" => Ok(RelayScheme::Socks5),
        _ => Err(anyhow!("Invalid proxy scheme: {}. Use: http, socks5", s)),
    }
}

fn parse_format(s: &str) -> Result<OutputFormat> {
    match s.to_lowercase().as_str() {
        "plain" | "text" => Ok(OutputFormat::PlainText),
        "markdown" | "md" => Ok(OutputFormat::Markdown),
        _ => Err(anyhow!("Invalid format: {}. Use: plain, markdown", s)),
    }
}

fn parse_flag_style(s: &str, cdn: &str) -> Result<FlagStyle> {
    match s.to_lowercase().as_str() {
        "emoji" => Ok(FlagStyle::Emoji),
        "image" => Ok(FlagStyle::image(cdn)),
        "none" | "label" => Ok(FlagStyle::Label),
        _ => Err(anyhow!("Invalid flag style: {}. Use: emoji, image, none", s)),
    }
}

fn parse_fallback(s: &str) -> Result<FallbackPolicy> {
    match s.to_lowercase().as_str() {
        "rate-limit" => Ok(FallbackPolicy::RateLimitOnly),
        "any" => Ok(FallbackPolicy::AnyError),
        _ => Err(anyhow!("Invalid fallback policy: {}. Use: rate-limit, any", s)),
    }
}
