use clap::Parser;
use robert_recorder::browser::{self, ChromeDriver, ConnectionMode, LiveRecording};
use robert_recorder::{JsonFileStore, MessageBus, Recorder, RecorderConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 9669)]
    port: u16,

    /// Page to open before recording
    #[arg(short, long)]
    url: Option<String>,

    /// Directory for session files (overrides the config file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run Chrome without a window
    #[arg(long)]
    headless: bool,

    /// Pass --no-sandbox to Chrome (Linux AppArmor workaround)
    #[arg(long)]
    no_sandbox: bool,

    /// Chrome executable to launch
    #[arg(long)]
    chrome_path: Option<String>,

    /// Attach to a Chrome already listening on this debug port instead of launching one
    #[arg(long)]
    debug_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RecorderConfig::from_file(path).await?,
        None => RecorderConfig::default(),
    };
    if let Some(output) = args.output {
        config.storage.state_file = Some(output.join("recorder-state.json"));
        config.storage.output_dir = output;
    }

    log::info!("Starting Robert Recorder on port {}", args.port);

    let store = Arc::new(JsonFileStore::new(config.storage.output_dir.clone()).await?);

    let mode = match args.debug_port {
        Some(port) => ConnectionMode::DebugPort(port),
        None => ConnectionMode::Sandboxed {
            chrome_path: args.chrome_path,
            no_sandbox: args.no_sandbox,
            headless: args.headless,
        },
    };
    let driver = Arc::new(ChromeDriver::new(mode).await?);
    if let Some(url) = &args.url {
        driver.navigate(url).await?;
    }

    let recorder = Recorder::new(config, store, driver.clone(), driver.clone());
    let restored = recorder.restore_state().await?;
    log::debug!("Recorder state: {:?}", restored);

    let target = browser::attach(&driver, &recorder).await?;
    log::info!("Recording target {}", target);
    let _live = LiveRecording::start(&driver, recorder.clone()).await?;

    let bus = MessageBus::spawn(recorder);
    let routes = robert_recorder::api::routes(bus);

    // Bind manually to handle "port in use" error gracefully
    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            log::info!("Listening on http://{}", addr);
            warp::serve(routes)
                .run_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
                .await;
        }
        Err(e) => {
            log::error!("Failed to bind to port {}: {}", args.port, e);
            anyhow::bail!("Port {} is already in use or unavailable", args.port);
        }
    }
    Ok(())
}
