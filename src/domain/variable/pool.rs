//! Single-writer store of node outputs

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::watch;

use super::error::VariableError;
use super::path::VariablePath;

#[derive(Debug, Clone)]
enum SlotState {
    Pending,
    Written(Arc<Value>),
    Unproduced,
}

/// Outputs keyed by producing node
///
/// Every producer owns one slot that settles exactly once, either with its
/// outputs or as unproduced. Readers suspend until the slot settles. A child
/// pool (one iteration item) owns the slots of its scope and reads everything
/// else through its parent.
#[derive(Debug)]
pub struct VariablePool {
    slots: HashMap<String, watch::Sender<SlotState>>,
    parent: Option<Arc<VariablePool>>,
}

impl VariablePool {
    pub fn new<I, S>(producers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slots = producers
            .into_iter()
            .map(|id| {
                let (tx, _) = watch::channel(SlotState::Pending);
                (id.into(), tx)
            })
            .collect();

        Self {
            slots,
            parent: None,
        }
    }

    /// Scope nested in `parent`, owning only `producers`
    pub fn child<I, S>(parent: Arc<VariablePool>, producers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pool = Self::new(producers);
        pool.parent = Some(parent);
        pool
    }

    fn slot(&self, node_id: &str) -> Option<&watch::Sender<SlotState>> {
        match self.slots.get(node_id) {
            Some(slot) => Some(slot),
            None => self.parent.as_deref().and_then(|p| p.slot(node_id)),
        }
    }

    /// Whether this scope (not its parents) owns the producer
    pub fn owns(&self, node_id: &str) -> bool {
        self.slots.contains_key(node_id)
    }

    /// Stores the outputs of `node_id` and wakes its readers
    pub fn write(&self, node_id: &str, outputs: Map<String, Value>) -> Result<(), VariableError> {
        let slot = self
            .slots
            .get(node_id)
            .ok_or_else(|| VariableError::UnknownProducer(node_id.to_string()))?;

        let value = Arc::new(Value::Object(outputs));
        let written = slot.send_if_modified(|state| match state {
            SlotState::Pending => {
                *state = SlotState::Written(value);
                true
            }
            _ => false,
        });

        if written {
            Ok(())
        } else {
            Err(VariableError::AlreadyWritten(node_id.to_string()))
        }
    }

    /// Settles `node_id` without a value; readers fail instead of waiting forever
    pub fn mark_unproduced(&self, node_id: &str) -> bool {
        match self.slots.get(node_id) {
            Some(slot) => slot.send_if_modified(|state| match state {
                SlotState::Pending => {
                    *state = SlotState::Unproduced;
                    true
                }
                _ => false,
            }),
            None => false,
        }
    }

    /// Waits for the producer to settle and returns its outputs
    pub async fn outputs(&self, node_id: &str) -> Result<Arc<Value>, VariableError> {
        let slot = self
            .slot(node_id)
            .ok_or_else(|| VariableError::UnknownProducer(node_id.to_string()))?;

        let mut rx = slot.subscribe();
        let state = rx
            .wait_for(|state| !matches!(state, SlotState::Pending))
            .await
            .map_err(|_| VariableError::Unproduced(node_id.to_string()))?
            .clone();

        match state {
            SlotState::Written(value) => Ok(value),
            SlotState::Pending | SlotState::Unproduced => {
                Err(VariableError::Unproduced(node_id.to_string()))
            }
        }
    }

    /// Resolves a path, suspending until its producer settles
    pub async fn resolve(&self, path: &VariablePath) -> Result<Value, VariableError> {
        let outputs = self.outputs(&path.node_id).await?;

        path.lookup(&outputs)
            .cloned()
            .ok_or_else(|| VariableError::PathNotFound(path.to_string()))
    }

    /// Outputs if already written, without waiting
    pub fn try_outputs(&self, node_id: &str) -> Option<Arc<Value>> {
        let slot = self.slot(node_id)?;
        let state = slot.borrow();

        match &*state {
            SlotState::Written(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Written entries owned by this scope
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.slots
            .iter()
            .filter_map(|(id, slot)| match &*slot.borrow() {
                SlotState::Written(value) => Some((id.clone(), (**value).clone())),
                _ => None,
            })
            .collect()
    }
}
