//! Shared clients keyed by endpoint.
//!
//! Lets independent parts of a program reuse one connection per server
//! instead of each opening its own.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::client::Client;
use crate::config::{ClientConfig, SharedKey};
use crate::error::Result;

/// Lazily populated map of `address:port` to a started [`Client`].
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, Arc<Client>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the client for `address:port`, creating and starting it on
    /// first use.
    ///
    /// The key only matters on creation; later lookups return the existing
    /// client whatever key they pass.
    pub async fn get_or_start(
        &self,
        key_hex: &str,
        address: &str,
        port: u16,
    ) -> Result<Arc<Client>> {
        let key = SharedKey::from_hex(key_hex)?;
        Ok(self.get_or_start_with(ClientConfig::new(key, address, port)).await)
    }

    /// Like [`get_or_start`](Self::get_or_start) with a full config.
    pub async fn get_or_start_with(&self, config: ClientConfig) -> Arc<Client> {
        let endpoint = config.endpoint();
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&endpoint) {
            return Arc::clone(client);
        }

        let client = Arc::new(Client::with_config(config));
        client.start().await;
        tracing::debug!("Registered client for {}", endpoint);
        clients.insert(endpoint, Arc::clone(&client));
        client
    }

    /// Look up an existing client.
    pub async fn get(&self, address: &str, port: u16) -> Option<Arc<Client>> {
        let endpoint = format!("{}:{}", address, port);
        self.clients.lock().await.get(&endpoint).cloned()
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }

    /// Stop and forget every client.
    pub async fn stop_all(&self) {
        let clients: Vec<Arc<Client>> = {
            let mut map = self.clients.lock().await;
            map.drain().map(|(_, client)| client).collect()
        };
        for client in clients {
            client.stop().await;
        }
    }
}
