//! Serve commands - HTTP and stdio transports

use anyhow::Result;
use neural_memory::mcp::http;
use neural_memory::{App, Config};

/// Run the HTTP transport. Refuses to start without an API key.
pub fn run_http(config: Config) -> Result<()> {
    let app = App::open(config)?;
    let state = app.http_state()?;
    let addr = app.config.socket_addr()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        // Checks drift (and loads the model) while the listener comes up
        let _check = app.spawn_startup_check();
        http::serve(addr, state).await
    })
}

#[cfg(feature = "mcp")]
pub fn run_stdio(config: Config) -> Result<()> {
    let app = App::open(config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let _check = app.spawn_startup_check();
        neural_memory::mcp::run_mcp_server(app.executor()).await
    })
}
