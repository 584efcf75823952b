//! Per-agent conversation state and message serialization.
//!
//! The manager owns one `AgentState` per agent name and a current-agent
//! pointer. A conversation is single-owner: `send_message` holds the only
//! working copy for the duration of one loop, and an atomic in-flight flag
//! rejects a second send to the same agent while one is running. Switching
//! the current agent during a send is allowed and affects the next send.

use crate::agent::Agent;
use crate::agent_loop::{execute_agent_with_callbacks, AgentTurn};
use crate::callbacks::{AgentCallbacks, ContentChunkFn};
use crate::types::Message;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub struct AgentState {
    agent: Mutex<Agent>,
    conversation: Mutex<Vec<Message>>,
    in_flight: AtomicBool,
}

impl AgentState {
    fn new(agent: Agent) -> Self {
        Self {
            agent: Mutex::new(agent),
            conversation: Mutex::new(Vec::new()),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Snapshot of the agent's current configuration.
    pub fn agent(&self) -> Agent {
        self.agent.lock().unwrap().clone()
    }

    /// Replace the agent's configuration; takes effect on the next turn.
    pub fn set_agent(&self, agent: Agent) {
        *self.agent.lock().unwrap() = agent;
    }

    pub fn conversation(&self) -> Vec<Message> {
        self.conversation.lock().unwrap().clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("unknown agent: {0}")]
    UnknownAgent(String),
    #[error("no agent configured")]
    NoCurrentAgent,
    #[error("agent '{0}' already has a message in flight")]
    Busy(String),
}

/// Clears the in-flight flag on every exit path, including unwinding.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct AgentManager {
    agents: Mutex<HashMap<String, Arc<AgentState>>>,
    current: Mutex<Option<String>>,
}

impl AgentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent. The first agent added becomes the current one.
    pub fn add_agent(&self, agent: Agent) {
        let name = agent.name.clone();
        self.agents
            .lock()
            .unwrap()
            .insert(name.clone(), Arc::new(AgentState::new(agent)));
        let mut current = self.current.lock().unwrap();
        if current.is_none() {
            *current = Some(name);
        }
    }

    pub fn get_agent(&self, name: &str) -> Option<Arc<AgentState>> {
        self.agents.lock().unwrap().get(name).cloned()
    }

    pub fn list_agents(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn current_agent(&self) -> Option<String> {
        self.current.lock().unwrap().clone()
    }

    pub fn set_current_agent(&self, name: &str) -> Result<(), ManagerError> {
        if !self.agents.lock().unwrap().contains_key(name) {
            return Err(ManagerError::UnknownAgent(name.to_string()));
        }
        *self.current.lock().unwrap() = Some(name.to_string());
        Ok(())
    }

    pub fn clear_current_conversation(&self) -> Result<(), ManagerError> {
        let name = self.current_agent().ok_or(ManagerError::NoCurrentAgent)?;
        let state = self
            .get_agent(&name)
            .ok_or(ManagerError::UnknownAgent(name))?;
        state.conversation.lock().unwrap().clear();
        Ok(())
    }

    /// Send a user message to the current agent, streaming content chunks
    /// to `on_chunk` when provided.
    pub async fn send_message(
        &self,
        text: &str,
        on_chunk: Option<ContentChunkFn>,
        cancel: CancellationToken,
    ) -> Result<AgentTurn, ManagerError> {
        let callbacks = AgentCallbacks {
            streaming: on_chunk.is_some(),
            on_content_chunk: on_chunk,
            ..Default::default()
        };
        self.send_message_with_callbacks(text, callbacks, cancel).await
    }

    /// Full-callbacks variant used by the dispatcher to wire the renderer.
    pub async fn send_message_with_callbacks(
        &self,
        text: &str,
        callbacks: AgentCallbacks,
        cancel: CancellationToken,
    ) -> Result<AgentTurn, ManagerError> {
        let name = self.current_agent().ok_or(ManagerError::NoCurrentAgent)?;
        let state = self
            .get_agent(&name)
            .ok_or_else(|| ManagerError::UnknownAgent(name.clone()))?;

        state
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ManagerError::Busy(name.clone()))?;
        let _guard = InFlightGuard(&state.in_flight);

        let agent = state.agent();
        let conversation = {
            let mut conversation = state.conversation.lock().unwrap();
            conversation.push(Message::user(text));
            conversation.clone()
        };

        let turn = execute_agent_with_callbacks(&conversation, &agent, &callbacks, cancel).await;

        // keep partial progress too; a cancelled turn stays in history
        *state.conversation.lock().unwrap() = turn.conversation.clone();
        Ok(turn)
    }
}
