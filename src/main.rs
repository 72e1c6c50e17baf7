use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use kwtag_dict::DictionaryStore;
use kwtag_types::Language;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use kwtagger::classifier::{ClassifierConfig, build_classifier};
use kwtagger::logging::init_tracing;
use kwtagger::{AppState, TaggingEngine, Tokenizers, router};

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_DICTIONARY_DIR: &str = "dictionaries";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config();
    info!("binding to {}:{}", config.host, config.port);
    info!("using dictionaries at {}", config.dictionary_dir.display());

    let store = Arc::new(DictionaryStore::new(&config.dictionary_dir));
    let classifier = build_classifier(config.classifier.clone())?;
    let engine = Arc::new(TaggingEngine::new(store, Tokenizers::default(), classifier));

    if config.warmup {
        let start = Instant::now();
        for language in Language::ALL {
            let phrases = engine.warm_up(language)?;
            info!("{language}: {phrases} phrases");
        }
        info!("dictionaries loaded in {} ms", start.elapsed().as_millis());
    }

    let state = AppState { engine };
    let app = router(state).layer(TraceLayer::new_for_http());
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid listen address")?;
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Clone)]
struct Config {
    host: String,
    port: u16,
    dictionary_dir: PathBuf,
    classifier: Option<ClassifierConfig>,
    warmup: bool,
}

fn load_config() -> Config {
    let mut disable_classifier = false;
    let mut warmup = true;
    let mut cli_dictionary_dir: Option<PathBuf> = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--no-classifier" => disable_classifier = true,
            "--no-warmup" => warmup = false,
            "--dictionary-dir" => {
                if let Some(path) = args.next() {
                    cli_dictionary_dir = Some(PathBuf::from(path));
                }
            }
            _ => {
                if let Some(path) = arg.strip_prefix("--dictionary-dir=") {
                    cli_dictionary_dir = Some(PathBuf::from(path));
                }
            }
        }
    }

    let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let dictionary_dir = cli_dictionary_dir
        .or_else(|| env::var("DICTIONARY_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DICTIONARY_DIR));
    let classifier = if disable_classifier {
        None
    } else {
        ClassifierConfig::from_env()
    };

    Config {
        host,
        port,
        dictionary_dir,
        classifier,
        warmup,
    }
}
