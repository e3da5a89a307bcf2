//! Typed, domain-constrained values attached to nodes

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::{debug, warn};

use crate::device::DeviceContext;
use crate::domain::{BoundingMode, Domain};
use crate::node::Node;
use crate::protocol::Origin;
use crate::value::{Value, ValueError, ValueType};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("write to {address} dropped: {source}")]
    TypeMismatch {
        address: String,
        #[source]
        source: ValueError,
    },
    #[error("{0} is read-only for remote writers")]
    ReadOnly(String),
}

/// Who may write a parameter over the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Get,
    Set,
    #[default]
    Bi,
}

impl AccessMode {
    pub fn is_writable(self) -> bool {
        !matches!(self, AccessMode::Get)
    }

    /// OSCQuery `ACCESS` number
    pub fn as_number(self) -> u8 {
        match self {
            AccessMode::Get => 1,
            AccessMode::Set => 2,
            AccessMode::Bi => 3,
        }
    }
}

/// Declaration of a parameter: where it lives and how it behaves.
///
/// ```
/// use paramtree_core::{Domain, ParameterSpec, ValueType};
///
/// let spec = ParameterSpec::new("list/vec3f", ValueType::Vec3f)
///     .default_value([-270.0, 180.0, 45.0])
///     .domain(Domain::range(0, 360).unwrap());
/// assert_eq!(spec.path(), "list/vec3f");
/// ```
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    path: String,
    value_type: ValueType,
    default_value: Option<Value>,
    domain: Option<Domain>,
    bounding: BoundingMode,
    access: AccessMode,
    description: Option<String>,
    repetition_filter: bool,
}

impl ParameterSpec {
    pub fn new(path: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            path: path.into(),
            value_type,
            default_value: None,
            domain: None,
            bounding: BoundingMode::default(),
            access: AccessMode::default(),
            description: None,
            repetition_filter: false,
        }
    }

    /// Initial value. It is converted to the declared type but not bounded.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn bounding(mut self, mode: BoundingMode) -> Self {
        self.bounding = mode;
        self
    }

    pub fn access(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Drop writes that would not change the stored value
    pub fn repetition_filter(mut self, enabled: bool) -> Self {
        self.repetition_filter = enabled;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Resolve the initial value, failing loudly on an unconvertible default
    pub(crate) fn initial_value(&self) -> Result<Value, ValueError> {
        match &self.default_value {
            Some(value) => value.clone().convert(self.value_type),
            None => Ok(self.value_type.default_value()),
        }
    }
}

/// Identifies a registered change callback
pub type CallbackId = u64;

type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

struct State {
    value: Value,
    domain: Option<Domain>,
    bounding: BoundingMode,
}

/// A typed value attached to a node
pub struct Parameter {
    node: Weak<Node>,
    value_type: ValueType,
    access: AccessMode,
    description: Option<String>,
    repetition_filter: bool,
    state: Mutex<State>,
    callbacks: RwLock<Vec<(CallbackId, Callback)>>,
    next_callback: AtomicU64,
    context: Arc<DeviceContext>,
}

impl Parameter {
    pub(crate) fn new(
        node: Weak<Node>,
        spec: &ParameterSpec,
        context: Arc<DeviceContext>,
    ) -> Result<Self, ValueError> {
        let value = spec.initial_value()?;
        Ok(Self {
            node,
            value_type: spec.value_type,
            access: spec.access,
            description: spec.description.clone(),
            repetition_filter: spec.repetition_filter,
            state: Mutex::new(State {
                value,
                domain: spec.domain.clone(),
                bounding: spec.bounding,
            }),
            callbacks: RwLock::new(Vec::new()),
            next_callback: AtomicU64::new(0),
            context,
        })
    }

    /// Current value
    pub fn value(&self) -> Value {
        self.state.lock().value.clone()
    }

    /// Write a value from the local API
    pub fn set_value(&self, value: impl Into<Value>) -> Result<Value, ParameterError> {
        self.apply(value.into(), Origin::Local)
    }

    /// The single write path shared by local callers and network endpoints.
    ///
    /// Converts `value` to the declared type, bounds it with the domain,
    /// stores it and notifies attached endpoints, all under the parameter
    /// lock. Local callbacks run after the lock is released. Returns the
    /// value actually stored.
    pub fn apply(&self, value: Value, origin: Origin) -> Result<Value, ParameterError> {
        if origin.is_remote() && !self.access.is_writable() {
            debug!(address = %self.address(), "Dropped remote write to read-only parameter");
            return Err(ParameterError::ReadOnly(self.address()));
        }

        let converted = match value.convert(self.value_type) {
            Ok(converted) => converted,
            Err(source) => {
                let address = self.address();
                warn!(address = %address, error = %source, "Dropped value write");
                return Err(ParameterError::TypeMismatch { address, source });
            }
        };

        // a parameter cut from the tree keeps its value but has no address
        let attached = self.node.upgrade().is_some_and(|node| node.holds(self));

        let stored = {
            let mut state = self.state.lock();
            let bounded = match &state.domain {
                Some(domain) => domain.apply(state.bounding, converted),
                None => converted,
            };
            if self.repetition_filter && bounded == state.value {
                return Ok(bounded);
            }
            state.value = bounded.clone();
            // endpoints see writes in the order they were stored
            if attached {
                self.context.publish(self, &bounded, &origin);
            }
            bounded
        };

        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback(&stored);
        }

        Ok(stored)
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn domain(&self) -> Option<Domain> {
        self.state.lock().domain.clone()
    }

    /// True whenever a domain is attached, whether or not it constrains
    /// this value type
    pub fn have_domain(&self) -> bool {
        self.state.lock().domain.is_some()
    }

    /// Replace the domain. The stored value is left as is.
    pub fn set_domain(&self, domain: Option<Domain>) {
        self.state.lock().domain = domain;
    }

    pub fn bounding(&self) -> BoundingMode {
        self.state.lock().bounding
    }

    pub fn set_bounding(&self, mode: BoundingMode) {
        self.state.lock().bounding = mode;
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn repetition_filter(&self) -> bool {
        self.repetition_filter
    }

    /// Owning node, `None` once the node has been dropped
    pub fn node(&self) -> Option<Arc<Node>> {
        self.node.upgrade()
    }

    /// Full address of the owning node
    pub fn address(&self) -> String {
        self.node
            .upgrade()
            .map(|node| node.address())
            .unwrap_or_default()
    }

    /// Register a callback run after every accepted write
    pub fn add_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.next_callback.fetch_add(1, Ordering::Relaxed);
        self.callbacks.write().push((id, Arc::new(callback)));
        id
    }

    pub fn remove_callback(&self, id: CallbackId) -> bool {
        let mut callbacks = self.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("address", &self.address())
            .field("value_type", &self.value_type)
            .field("value", &self.value())
            .finish()
    }
}
