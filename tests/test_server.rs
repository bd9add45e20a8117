//! Local HTTP server for tests
//!
//! Serves a login form and a page with a timed loading spinner so recording
//! tests never depend on external websites.
//!
//! Each server instance runs on a random available port for perfect test isolation.

use std::net::SocketAddr;
use tokio::sync::oneshot;
use warp::Filter;

const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <title>Sign in</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
</head>
<body>
    <main>
        <form id="login" action="/next" method="get">
            <input type="email" name="email">
            <input type="password" name="pwd">
            <button id="submit-btn" type="submit">Sign in</button>
        </form>
    </main>
    <nav><a id="next-link" href="/next">Next</a></nav>
</body>
</html>"#;

const LOADING_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <title>Dashboard</title>
</head>
<body>
    <div class="spinner">Loading</div>
    <section id="content"></section>
    <script>
        setTimeout(() => {
            document.querySelector('.spinner').style.display = 'none';
            document.getElementById('content').textContent = 'Ready';
        }, 1500);
    </script>
</body>
</html>"#;

/// Test server that serves the recording pages
pub struct TestServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Start a new test server on a random available port
    pub async fn start() -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        // Routes
        let index = warp::path::end().map(|| warp::reply::html(LOGIN_PAGE));
        let next = warp::path("next").map(|| warp::reply::html(LOADING_PAGE));
        let routes = index.or(next);

        // Bind to random port
        let (addr, server) =
            warp::serve(routes).bind_with_graceful_shutdown(([127, 0, 0, 1], 0), async {
                shutdown_rx.await.ok();
            });

        // Spawn server in background
        tokio::spawn(server);

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this server (e.g., "http://127.0.0.1:12345")
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address (for meta tests)
    #[allow(dead_code)]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the server to be ready by making a test request
    pub async fn wait_ready(&self) -> anyhow::Result<()> {
        let url = self.url();
        let max_attempts = 10;

        for attempt in 1..=max_attempts {
            match reqwest::get(&url).await {
                Ok(response) if response.status().is_success() => {
                    println!("✅ Test server ready on: {}", url);
                    return Ok(());
                }
                Ok(response) => {
                    println!(
                        "⚠️ Attempt {}: Server returned status {}",
                        attempt,
                        response.status()
                    );
                }
                Err(e) => {
                    println!("⚠️ Attempt {}: Server not ready - {}", attempt, e);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            }
        }

        anyhow::bail!(
            "Server did not become ready after {} attempts",
            max_attempts
        )
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Signal server to shutdown
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
