// src/server/mod.rs

//! The reactor shell around the engine: a single task selecting over the
//! inbound event channel, delivered cluster messages, library requests and
//! the earliest timer deadline. The engine itself never blocks; everything
//! asynchronous re-enters through one of these channels.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{error, info};

use crate::config::Config;
use crate::core::actuator::{ScriptActuator, SystemRepairer};
use crate::core::client::ClientRequest;
use crate::core::engine::Engine;
use crate::core::events::AmfEvent;
use crate::core::loader;
use crate::core::transport::{ClusterMessage, ClusterTransport, LoopbackTransport, MembershipChange};

/// Handles used to feed the reactor from outside (library IPC, membership).
#[derive(Clone)]
pub struct ReactorHandle {
    events: UnboundedSender<AmfEvent>,
    requests: UnboundedSender<ClientRequest>,
}

impl ReactorHandle {
    pub fn send_event(&self, event: AmfEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|e| anyhow!("reactor gone: {e}"))
    }

    pub fn send_request(&self, req: ClientRequest) -> Result<()> {
        self.requests
            .send(req)
            .map_err(|e| anyhow!("reactor gone: {e}"))
    }
}

pub struct Reactor {
    engine: Engine,
    transport: Box<dyn ClusterTransport>,
    events_rx: UnboundedReceiver<AmfEvent>,
    requests_rx: UnboundedReceiver<ClientRequest>,
    messages_rx: UnboundedReceiver<ClusterMessage>,
    tick_interval: Duration,
}

impl Reactor {
    /// Builds the full single-node runtime: model from the configured file,
    /// engine with the script actuator, loopback transport.
    pub fn build(config: &Config) -> Result<(Self, ReactorHandle)> {
        let content = std::fs::read_to_string(&config.model_file)
            .with_context(|| format!("Failed to read model file '{}'", config.model_file))?;
        let model = loader::load_model(&content)
            .with_context(|| format!("Failed to load model file '{}'", config.model_file))?;

        let self_node = model
            .find_node(&config.node_name)
            .ok_or_else(|| anyhow!("node '{}' is not in the model", config.node_name))?;

        let (events_tx, events_rx) = unbounded_channel();
        let (requests_tx, requests_rx) = unbounded_channel();
        let (messages_tx, messages_rx) = unbounded_channel();

        let engine = Engine::new(
            model,
            self_node,
            Box::new(ScriptActuator::new(events_tx.clone())),
            Box::new(SystemRepairer),
        );

        let reactor = Self {
            engine,
            transport: Box::new(LoopbackTransport::new(messages_tx)),
            events_rx,
            requests_rx,
            messages_rx,
            tick_interval: Duration::from_millis(config.timing.tick_interval_ms),
        };
        let handle = ReactorHandle {
            events: events_tx,
            requests: requests_tx,
        };
        Ok((reactor, handle))
    }

    /// Applies one membership change by turning it into node events.
    pub fn membership_changed(&mut self, change: &MembershipChange) -> Result<()> {
        let mut events = Vec::new();
        for &joined in &change.joined {
            if let Some(node) = self.engine.model.find_node_by_nodeid(joined) {
                events.push(AmfEvent::NodeSyncReady(node));
            }
        }
        for &left in &change.left {
            if let Some(node) = self.engine.model.find_node_by_nodeid(left) {
                events.push(AmfEvent::NodeLeave(node));
            }
        }
        for event in events {
            self.engine.dispatch(event)?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.engine.run_until_idle()?;
        loop {
            let outbox = self.engine.take_outbox();
            let callbacks = self.engine.take_callbacks();
            if outbox.is_empty() && callbacks.is_empty() {
                break;
            }
            for msg in outbox {
                self.transport.mcast(&msg).await?;
            }
            for cb in callbacks {
                // Delivered through the component's library session by the
                // IPC layer; nothing to do in the loopback runtime.
                info!(
                    "Healthcheck callback '{}' pending for component {:?} (invocation {})",
                    cb.key, cb.comp, cb.invocation
                );
            }
            self.engine.run_until_idle()?;
        }
        Ok(())
    }

    /// The reactor main loop. Runs until all channels close or the engine
    /// reports a fatal contract violation.
    pub async fn run(mut self) -> Result<()> {
        info!("Reactor running");
        loop {
            self.flush().await?;

            let deadline = self
                .engine
                .timers
                .next_deadline()
                .unwrap_or_else(|| Instant::now() + self.tick_interval);
            let sleep = tokio::time::sleep(deadline.saturating_duration_since(Instant::now()));

            tokio::select! {
                event = self.events_rx.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.engine.dispatch(event) {
                            error!("Fatal engine error: {}", e);
                            return Err(e.into());
                        }
                    }
                    None => return Ok(()),
                },
                msg = self.messages_rx.recv() => match msg {
                    Some(msg) => {
                        if let Err(e) = self.engine.handle_message(msg) {
                            error!("Fatal engine error: {}", e);
                            return Err(e.into());
                        }
                    }
                    None => return Ok(()),
                },
                req = self.requests_rx.recv() => match req {
                    Some(req) => {
                        if let Err(e) = self.engine.handle_client(req) {
                            error!("Library request failed: {}", e);
                        }
                    }
                    None => return Ok(()),
                },
                _ = sleep => {}
            }
        }
    }

    /// Kicks off a single-node cluster: this node is immediately sync-ready.
    pub fn bootstrap(&mut self) -> Result<()> {
        let node = self.engine.self_node;
        self.engine.dispatch(AmfEvent::NodeSyncReady(node))?;
        Ok(())
    }
}
