use sl_core::LoaderError;
use sl_core::LoaderResult;
use sl_loader::BootstrapOutcome;
use sl_loader::BootstrapReport;
use sl_loader::BootstrapRequest;
use sl_loader::LoaderConfig;
use sl_loader::NetworkFetch;
use sl_loader::ShellLoader;
use sl_net::ClientConfig;
use sl_storage::ClientStorage;
use sl_storage::MemoryStorage;
use sl_storage::StorageConfig;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

const DEFAULT_SHELL: &str = "<!doctype html><html><head><meta charset=\"utf-8\"></head><body></body></html>";
const USAGE: &str = "usage: shell-loader --page-url <url> [--shell <file>] [--origin <url>] \
[--loader-src <url>] [--force-refresh] [--config <file>] [--storage-dir <dir>] [--out <file>]";

#[derive(Debug, Default)]
struct CliArgs {
    page_url: String,
    shell: Option<PathBuf>,
    origin: Option<String>,
    loader_src: Option<String>,
    force_refresh: bool,
    config: Option<PathBuf>,
    storage_dir: Option<PathBuf>,
    out: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(error) => {
            eprintln!("{error}\n{USAGE}");
            return ExitCode::from(2);
        }
    };
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("shell-loader: failed to start runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(BootstrapOutcome::Revealed) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(3),
        Err(error) => {
            eprintln!("shell-loader: {error}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs, String> {
    let mut parsed = CliArgs::default();
    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().ok_or_else(|| format!("missing value after {name}"));
        match arg.as_str() {
            "--page-url" => parsed.page_url = value("--page-url")?,
            "--shell" => parsed.shell = Some(PathBuf::from(value("--shell")?)),
            "--origin" => parsed.origin = Some(value("--origin")?),
            "--loader-src" => parsed.loader_src = Some(value("--loader-src")?),
            "--force-refresh" => parsed.force_refresh = true,
            "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
            "--storage-dir" => parsed.storage_dir = Some(PathBuf::from(value("--storage-dir")?)),
            "--out" => parsed.out = Some(PathBuf::from(value("--out")?)),
            "-h" | "--help" => return Err("shell-loader renders a shell page through the content proxy".to_owned()),
            other => return Err(format!("unknown argument `{other}`")),
        }
    }
    if parsed.page_url.is_empty() {
        return Err("--page-url is required".to_owned());
    }
    Ok(parsed)
}

async fn run(args: CliArgs) -> LoaderResult<BootstrapOutcome> {
    let config = match &args.config {
        Some(path) => LoaderConfig::from_json_file(path)?,
        None => LoaderConfig::default(),
    };
    let shell_html = match &args.shell {
        Some(path) => read_file(path)?,
        None => DEFAULT_SHELL.to_owned(),
    };

    let storage = open_storage(&args);

    let client_config = ClientConfig::default();
    let user_agent = client_config.user_agent.clone();
    let fetch = NetworkFetch::new(client_config)?;
    let loader = ShellLoader::new(config, fetch, storage).with_user_agent(user_agent);
    let request = bootstrap_request(&args, shell_html);
    let done = loader.bootstrap(&request).await?;

    let html = done.document().to_html();
    match &args.out {
        Some(path) => std::fs::write(path, html).map_err(|error| {
            LoaderError::new(
                "app.output.write_failed",
                format!("failed to write `{}`: {error}", path.display()),
            )
        })?,
        None => println!("{html}"),
    }
    print_summary(&done.report);
    Ok(done.report.outcome)
}

/// `--origin` applies to this run only; it is never written to storage.
fn bootstrap_request(args: &CliArgs, shell_html: String) -> BootstrapRequest {
    BootstrapRequest {
        page_url: args.page_url.clone(),
        shell_html,
        loader_src: args.loader_src.clone(),
        origin_override: args.origin.clone(),
        force_refresh: args.force_refresh,
    }
}

fn open_storage(args: &CliArgs) -> ClientStorage {
    let Some(root) = args.storage_dir.clone() else {
        return ClientStorage::from_areas(Box::new(MemoryStorage::new()), Box::new(MemoryStorage::new()));
    };
    let site = Url::parse(&args.page_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_owned))
        .unwrap_or_else(|| "localhost".to_owned());
    info!(root = %root.display(), %site, "using persistent storage");
    ClientStorage::new(StorageConfig::default(), &site, Some(root))
}

fn read_file(path: &Path) -> LoaderResult<String> {
    std::fs::read_to_string(path).map_err(|error| {
        LoaderError::new(
            "app.shell.read_failed",
            format!("failed to read `{}`: {error}", path.display()),
        )
    })
}

fn print_summary(report: &BootstrapReport) {
    eprintln!("key:        {}", report.key);
    eprintln!("origin:     {}", report.origin);
    eprintln!("source:     {:?}", report.source);
    eprintln!("rewritten:  {}", report.rewritten_references);
    eprintln!("stylesheets: {}", report.stylesheets.len());
    if let Some(replay) = &report.replay {
        eprintln!(
            "scripts:    {} executed, {} threw, {} inert, ads {:?}",
            replay.executed, replay.threw, replay.inert, replay.ads
        );
    }
    eprintln!("ready:      {:?}", report.ready);
    eprintln!("settle:     {:?}", report.settle);
    eprintln!("phases:     {:?}", report.phases);
    eprintln!("outcome:    {:?}", report.outcome);
}
