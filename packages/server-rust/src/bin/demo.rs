//! Scripted walk through a memory-backed application.
//!
//! Registers `messages` and `users`, subscribes a listener to `messages`,
//! runs a sequence of calls through the call pipeline and logs what comes
//! back.

use clap::Parser;
use serde_json::json;
use tern_core::{Id, Method, Methods, PaginateConfig, Params, Payload};
use tern_server::logging::{init_tracing, LogFormat};
use tern_server::memory::MemoryService;
use tern_server::service::{ListenerContext, ServerConfig, ServiceCall, ServiceOptions};
use tern_server::Application;

#[derive(Debug, Parser)]
#[command(name = "tern-demo", about = "Runs scripted calls against in-memory services")]
struct Args {
    /// Log output format (`compact` or `json`).
    #[arg(long, env = "TERN_LOG_FORMAT", default_value = "compact")]
    log_format: LogFormat,

    /// Default page size for `find`; 0 disables pagination.
    #[arg(long, env = "TERN_PAGE_SIZE", default_value_t = 2)]
    page_size: usize,

    /// Upper bound for `$limit`.
    #[arg(long, env = "TERN_MAX_PAGE_SIZE", default_value_t = 10)]
    max_page_size: usize,

    /// Per-call timeout in milliseconds.
    #[arg(long, env = "TERN_CALL_TIMEOUT_MS", default_value_t = 5_000)]
    call_timeout_ms: u64,

    /// JSON file with a `ServerConfig`; flags override the page sizes and timeout.
    #[arg(long, env = "TERN_CONFIG")]
    config: Option<std::path::PathBuf>,
}

impl Args {
    fn server_config(&self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_json_str(&std::fs::read_to_string(path)?)?,
            None => ServerConfig::default(),
        };
        config.name = "tern-demo".to_string();
        config.default_call_timeout_ms = self.call_timeout_ms;
        config.paginate =
            (self.page_size > 0).then(|| PaginateConfig::new(self.page_size, self.max_page_size));
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let app = Application::with_config(args.server_config()?);
    let messages = app.use_service("messages", MemoryService::new())?;
    app.use_service(
        "users",
        MemoryService::new().with_methods(Methods::READ | Method::Create),
    )?;
    app.register(
        "audit",
        MemoryService::new(),
        ServiceOptions::new()
            .with("internal", json!(true))
            .with("timeout_ms", json!(2_000)),
    )?;
    app.setup().await?;
    tracing::info!(routes = ?app.routes(), "services mounted");

    messages.filter(|event, context| {
        context
            .get("room")
            .map_or(true, |room| event.data.get("room") == Some(room))
    });
    let mut lobby = messages.subscribe(ListenerContext::from_iter([(
        "room".to_string(),
        json!("lobby"),
    )]));

    let script = [
        (
            "users",
            ServiceCall::Create {
                data: Payload::Many(vec![json!({ "name": "ada" }), json!({ "name": "bob" })]),
                params: Params::new(),
            },
        ),
        (
            "messages",
            ServiceCall::Create {
                data: Payload::Many(vec![
                    json!({ "room": "lobby", "text": "hello", "user": 0 }),
                    json!({ "room": "attic", "text": "anyone?", "user": 1 }),
                    json!({ "room": "lobby", "text": "hi ada", "user": 1 }),
                ]),
                params: Params::new(),
            },
        ),
        (
            "messages",
            ServiceCall::Find {
                params: Params::from_query(json!({ "$sort": { "text": 1 } }))?,
            },
        ),
        (
            "messages",
            ServiceCall::Patch {
                id: None,
                data: json!({ "read": true }),
                params: Params::from_query(json!({ "room": "lobby" }))?,
            },
        ),
        (
            "messages",
            ServiceCall::Remove {
                id: Some(Id::Int(1)),
                params: Params::new(),
            },
        ),
        (
            "users",
            ServiceCall::Update {
                id: Some(Id::Int(0)),
                data: json!({ "name": "eve" }),
                params: Params::new(),
            },
        ),
        (
            "nowhere",
            ServiceCall::Find {
                params: Params::new(),
            },
        ),
    ];

    for (location, call) in script {
        let method = call.method();
        match app.request(location, call).await {
            Ok(response) => {
                tracing::info!(location, %method, result = %response.into_value(), "call succeeded");
            }
            Err(err) => {
                tracing::warn!(location, %method, code = err.code(), error = %err, "call failed");
            }
        }
    }

    for event in lobby.drain() {
        tracing::info!(
            location = %event.location,
            event = event.name(),
            data = %event.data,
            "lobby listener received"
        );
    }
    Ok(())
}
