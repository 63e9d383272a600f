// sphinx-pool demo binary
// Exercises a pooled data source against an in-memory search client.
// Set RUST_LOG=sphinx_pool=debug to watch resources being created and recycled.

use sphinx_pool::{ClientError, Endpoint, PooledSearchDataSource, SearchClient};
use std::time::Duration;

/// Search client that answers from memory instead of a socket
struct EchoClient {
    endpoint: Endpoint,
    connected: bool,
    queued: Vec<String>,
}

impl SearchClient for EchoClient {
    type Response = String;

    fn open(&mut self) -> Result<(), ClientError> {
        self.connected = true;
        Ok(())
    }

    fn close(&mut self) -> bool {
        self.connected = false;
        true
    }

    fn set_server(&mut self, host: &str, port: u16) -> Result<(), ClientError> {
        self.endpoint = Endpoint::new(host, port);
        Ok(())
    }

    fn set_connect_timeout(&mut self, _timeout: Duration) {}

    fn is_connect_error(&self) -> bool {
        false
    }

    fn last_error(&self) -> Option<&str> {
        None
    }

    fn last_warning(&self) -> Option<&str> {
        None
    }

    fn query(&mut self, query: &str, index: &str) -> Result<String, ClientError> {
        if !self.connected {
            return Err(ClientError::Server("not connected".to_string()));
        }
        Ok(format!("{} answered '{}' from {}", self.endpoint, query, index))
    }

    fn add_query(&mut self, query: &str, _index: &str, _comment: &str) -> Result<usize, ClientError> {
        self.queued.push(query.to_string());
        Ok(self.queued.len() - 1)
    }

    fn run_queries(&mut self) -> Result<Vec<String>, ClientError> {
        Ok(std::mem::take(&mut self.queued))
    }

    fn reset_filters(&mut self) {}
}

/// Install a `RUST_LOG`-driven subscriber
fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn main() -> Result<(), ClientError> {
    setup_tracing();

    println!("=== sphinx-pool ===");
    let source = PooledSearchDataSource::new(Endpoint::new("localhost", 9312), |endpoint: &Endpoint| {
        Ok(EchoClient {
            endpoint: endpoint.clone(),
            connected: false,
            queued: Vec::new(),
        })
    });
    source.set_max_total(Some(2));

    {
        let client = source.client()?;
        println!("  {}", client.query("rust pools", "articles")?);
        println!("  Active: {}, Idle: {}", source.num_active(), source.num_idle());
        client.close()?;
    }
    println!("  After close - Active: {}, Idle: {}", source.num_active(), source.num_idle());

    source.set_server("search-2", 9306);
    println!("  Idle after switching servers: {}", source.num_idle());

    let client = source.client()?;
    println!("  {}", client.query("rust pools", "articles")?);

    println!();
    for (key, value) in source.pool().export_metrics() {
        println!("  {}: {}", key, value);
    }
    Ok(())
}
