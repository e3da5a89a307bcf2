//! Devices: the root of a parameter tree and the unit exposed to the network

use parking_lot::RwLock;
use std::fmt;
use std::fmt::Write as _;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use crate::node::{split_path, Node, NodeError};
use crate::parameter::{Parameter, ParameterSpec};
use crate::protocol::{Origin, Protocol, ProtocolId};
use crate::value::Value;

/// State shared by every node and parameter of one device.
///
/// Holds the attached endpoints but never the nodes, so no reference
/// cycle exists between the tree and the context.
#[derive(Default)]
pub(crate) struct DeviceContext {
    protocols: RwLock<Vec<Arc<dyn Protocol>>>,
}

impl DeviceContext {
    pub(crate) fn publish(&self, parameter: &Parameter, value: &Value, origin: &Origin) {
        for protocol in self.protocols.read().iter() {
            protocol.push(parameter, value, origin);
        }
    }

    pub(crate) fn announce_created(&self, node: &Arc<Node>) {
        for protocol in self.protocols.read().iter() {
            protocol.node_created(node);
        }
    }

    pub(crate) fn announce_removed(&self, address: &str) {
        for protocol in self.protocols.read().iter() {
            protocol.node_removed(address);
        }
    }

    fn stop_all(&self) {
        let protocols = std::mem::take(&mut *self.protocols.write());
        for protocol in protocols {
            debug!(protocol = protocol.name(), id = protocol.id(), "Stopping endpoint");
            protocol.stop();
        }
    }
}

struct DeviceInner {
    name: String,
    root: Arc<Node>,
    context: Arc<DeviceContext>,
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        self.context.stop_all();
    }
}

/// A local device: a named parameter tree.
///
/// Cloning is cheap and yields another handle to the same tree. The tree
/// and its endpoints are torn down when the last handle is dropped.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        let context = Arc::new(DeviceContext::default());
        let root = Node::new_root(context.clone());
        Self {
            inner: Arc::new(DeviceInner {
                name: name.into(),
                root,
                context,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn root_node(&self) -> &Arc<Node> {
        &self.inner.root
    }

    /// Resolve an absolute path; `None` when nothing lives there
    pub fn find_node(&self, path: &str) -> Option<Arc<Node>> {
        self.inner.root.find(path)
    }

    pub fn find_parameter(&self, path: &str) -> Option<Arc<Parameter>> {
        self.find_node(path).and_then(|node| node.parameter())
    }

    /// Resolve `path`, creating missing nodes along the way
    pub fn find_or_create_node(&self, path: &str) -> Result<Arc<Node>, NodeError> {
        let segments: Vec<&str> = split_path(path).collect();
        if segments.is_empty() {
            return Err(NodeError::InvalidName(path.to_string()));
        }

        let mut current = self.inner.root.clone();
        for segment in segments {
            current = current.find_or_create_child(segment)?;
        }
        Ok(current)
    }

    /// Declare a parameter at `spec.path()`.
    ///
    /// Fails if the default value cannot be converted to the declared type,
    /// if a path segment is not a valid name, or if a parameter already
    /// lives at that address.
    pub fn add_param(&self, spec: ParameterSpec) -> Result<Arc<Parameter>, NodeError> {
        spec.initial_value()?;
        let node = self.find_or_create_node(spec.path())?;
        node.create_parameter(&spec)
    }

    /// Attach an endpoint; it starts receiving value writes immediately
    pub fn attach_protocol(&self, protocol: Arc<dyn Protocol>) {
        info!(
            device = %self.inner.name,
            protocol = protocol.name(),
            id = protocol.id(),
            "Attached endpoint"
        );
        self.inner.context.protocols.write().push(protocol);
    }

    /// Detach and stop one endpoint
    pub fn detach_protocol(&self, id: ProtocolId) -> bool {
        let removed = {
            let mut protocols = self.inner.context.protocols.write();
            let position = protocols.iter().position(|p| p.id() == id);
            position.map(|index| protocols.remove(index))
        };
        match removed {
            Some(protocol) => {
                protocol.stop();
                true
            }
            None => false,
        }
    }

    pub fn protocols(&self) -> Vec<Arc<dyn Protocol>> {
        self.inner.context.protocols.read().clone()
    }

    /// Stop and detach every endpoint. Safe to call more than once.
    pub fn shutdown(&self) {
        self.inner.context.stop_all();
    }

    pub fn downgrade(&self) -> WeakDevice {
        WeakDevice(Arc::downgrade(&self.inner))
    }

    /// Indented listing of the tree, one node per line
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for node in self.inner.root.descendants(None) {
            let depth = node.address().matches('/').count();
            let indent = "  ".repeat(depth.saturating_sub(1));
            let _ = match node.parameter() {
                Some(param) => writeln!(
                    out,
                    "{}{} ({}) = {}",
                    indent,
                    node.name(),
                    param.value_type(),
                    param.value()
                ),
                None => writeln!(out, "{}{}", indent, node.name()),
            };
        }
        out
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.inner.name)
            .field("protocols", &self.inner.context.protocols.read().len())
            .finish()
    }
}

/// Non-owning device handle held by endpoints
#[derive(Clone)]
pub struct WeakDevice(Weak<DeviceInner>);

impl WeakDevice {
    pub fn upgrade(&self) -> Option<Device> {
        self.0.upgrade().map(|inner| Device { inner })
    }
}

impl fmt::Debug for WeakDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakDevice")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;
    use crate::protocol::next_protocol_id;
    use crate::value::ValueType;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    #[derive(Default)]
    struct Recorder {
        id: ProtocolId,
        pushed: Mutex<Vec<(String, Value, Origin)>>,
        created: Mutex<Vec<String>>,
        removed: Mutex<Vec<String>>,
        stops: AtomicUsize,
        running: AtomicBool,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: next_protocol_id(),
                running: AtomicBool::new(true),
                ..Default::default()
            })
        }
    }

    impl Protocol for Recorder {
        fn id(&self) -> ProtocolId {
            self.id
        }

        fn name(&self) -> &'static str {
            "recorder"
        }

        fn push(&self, parameter: &Parameter, value: &Value, origin: &Origin) {
            self.pushed
                .lock()
                .push((parameter.address(), value.clone(), *origin));
        }

        fn node_created(&self, node: &Arc<Node>) {
            self.created.lock().push(node.address());
        }

        fn node_removed(&self, address: &str) {
            self.removed.lock().push(address.to_string());
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.running.store(false, Ordering::SeqCst);
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_device_name_and_root() {
        let device = Device::new("PyOssia Test Device");
        assert_eq!(device.name(), "PyOssia Test Device");
        assert_eq!(device.root_node().address(), "/");
        assert!(device.find_node("/").unwrap().is_root());
    }

    #[test]
    fn test_add_param_conflict() {
        let device = Device::new("dev");
        device
            .add_param(ParameterSpec::new("a/b", ValueType::Int))
            .unwrap();
        assert!(matches!(
            device.add_param(ParameterSpec::new("/a/b", ValueType::Float)),
            Err(NodeError::AddressConflict(_))
        ));
        // organizational node can still gain a parameter
        assert!(device
            .add_param(ParameterSpec::new("a", ValueType::Bool))
            .is_ok());
        assert!(matches!(
            device.add_param(ParameterSpec::new("/", ValueType::Bool)),
            Err(NodeError::InvalidName(_))
        ));
    }

    #[test]
    fn test_writes_reach_endpoints_with_origin() {
        let device = Device::new("dev");
        let recorder = Recorder::new();
        device.attach_protocol(recorder.clone());

        let param = device
            .add_param(
                ParameterSpec::new("gain", ValueType::Float)
                    .domain(Domain::range(0, 1).unwrap()),
            )
            .unwrap();
        param.set_value(3.0).unwrap();
        param
            .apply(Value::Float(0.25), Origin::peer(recorder.id, 4))
            .unwrap();

        let pushed = recorder.pushed.lock();
        assert_eq!(pushed.len(), 2);
        assert_eq!(pushed[0], ("/gain".to_string(), Value::Float(1.0), Origin::Local));
        assert_eq!(pushed[1].2, Origin::peer(recorder.id, 4));
    }

    #[test]
    fn test_rejected_write_is_not_pushed() {
        let device = Device::new("dev");
        let recorder = Recorder::new();
        device.attach_protocol(recorder.clone());

        let param = device
            .add_param(ParameterSpec::new("pos", ValueType::Vec2f))
            .unwrap();
        assert!(param.set_value("nope").is_err());
        assert!(recorder.pushed.lock().is_empty());
    }

    #[test]
    fn test_init_announces_once() {
        let device = Device::new("dev");
        let recorder = Recorder::new();
        device.attach_protocol(recorder.clone());

        device
            .add_param(ParameterSpec::new("special/bool", ValueType::Bool))
            .unwrap();
        assert!(recorder.created.lock().is_empty());

        device.root_node().init();
        device.root_node().init();
        assert_eq!(
            *recorder.created.lock(),
            vec!["/special".to_string(), "/special/bool".to_string()]
        );

        device
            .add_param(ParameterSpec::new("special/char", ValueType::Char))
            .unwrap();
        assert_eq!(recorder.created.lock().last().unwrap(), "/special/char");

        device.root_node().remove_child("special");
        assert_eq!(*recorder.removed.lock(), vec!["/special".to_string()]);
    }

    #[test]
    fn test_removed_subtree_is_not_published() {
        let device = Device::new("dev");
        let recorder = Recorder::new();
        device.attach_protocol(recorder.clone());

        let vec2f = device
            .add_param(ParameterSpec::new("list/vec2f", ValueType::Vec2f))
            .unwrap();
        assert!(device.root_node().remove_child("list"));
        assert!(device.find_node("/list").is_none());

        // the handle still works locally
        assert_eq!(
            vec2f.set_value([0.3, 0.4]).unwrap(),
            Value::Vec2f([0.3, 0.4])
        );
        assert_eq!(vec2f.address(), "");
        assert!(recorder.pushed.lock().is_empty());
    }

    #[test]
    fn test_remove_parameter_is_announced() {
        let device = Device::new("dev");
        let recorder = Recorder::new();
        device.attach_protocol(recorder.clone());

        let first = device
            .add_param(ParameterSpec::new("out/gain", ValueType::Float))
            .unwrap();
        let node = device.find_node("/out/gain").unwrap();

        // nothing is announced before init
        assert!(node.remove_parameter().is_some());
        assert!(recorder.removed.lock().is_empty());

        let second = node
            .create_parameter(&ParameterSpec::new("gain", ValueType::Float))
            .unwrap();
        device.root_node().init();
        recorder.created.lock().clear();

        assert!(node.remove_parameter().is_some());
        assert!(!node.has_parameter());
        assert!(node.remove_parameter().is_none());
        assert_eq!(*recorder.removed.lock(), vec!["/out/gain".to_string()]);
        assert_eq!(*recorder.created.lock(), vec!["/out/gain".to_string()]);

        // detached handles no longer reach endpoints
        first.set_value(0.5).unwrap();
        second.set_value(0.7).unwrap();
        assert_eq!(second.value(), Value::Float(0.7));
        assert!(recorder.pushed.lock().is_empty());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let device = Device::new("dev");
        let first = Recorder::new();
        let second = Recorder::new();
        device.attach_protocol(first.clone());
        device.attach_protocol(second.clone());

        assert!(device.detach_protocol(first.id));
        assert!(!device.detach_protocol(first.id));
        device.shutdown();
        device.shutdown();

        assert_eq!(first.stops.load(Ordering::SeqCst), 1);
        assert_eq!(second.stops.load(Ordering::SeqCst), 1);
        assert!(device.protocols().is_empty());
    }

    #[test]
    fn test_drop_stops_endpoints() {
        let recorder = Recorder::new();
        let weak = {
            let device = Device::new("dev");
            device.attach_protocol(recorder.clone());
            device.downgrade()
        };
        assert!(weak.upgrade().is_none());
        assert!(!recorder.is_running());
    }

    #[test]
    fn test_dump() {
        let device = Device::new("dev");
        device
            .add_param(ParameterSpec::new("int", ValueType::Int).default_value(66))
            .unwrap();
        device
            .add_param(ParameterSpec::new("special/bool", ValueType::Bool).default_value(true))
            .unwrap();
        assert_eq!(
            device.dump(),
            "int (int) = 66\nspecial\n  bool (bool) = true\n"
        );
    }

    #[test]
    fn test_concurrent_writers_leave_one_value() {
        let device = Device::new("dev");
        let recorder = Recorder::new();
        device.attach_protocol(recorder.clone());
        let param = device
            .add_param(ParameterSpec::new("list/vec3f", ValueType::Vec3f))
            .unwrap();
        for i in 0..20 {
            device
                .add_param(ParameterSpec::new(format!("extra/p{}", i), ValueType::Int))
                .unwrap();
        }

        let attempted: Vec<Value> = (0..16)
            .map(|i| {
                let x = f64::from(i);
                Value::Vec3f([x, x * 10.0, x * 100.0])
            })
            .collect();

        let done = Arc::new(AtomicBool::new(false));
        let walker = {
            let device = device.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut walks = 0;
                loop {
                    assert_eq!(device.root_node().get_parameters(None).count(), 21);
                    walks += 1;
                    if done.load(Ordering::SeqCst) {
                        break walks;
                    }
                }
            })
        };

        let writers: Vec<_> = attempted
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, value)| {
                let param = param.clone();
                let origin = if i % 2 == 0 {
                    Origin::Local
                } else {
                    Origin::remote(recorder.id)
                };
                thread::spawn(move || {
                    for _ in 0..200 {
                        param.apply(value.clone(), origin).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::SeqCst);
        assert!(walker.join().unwrap() > 0);

        let stored = param.value();
        assert!(attempted.contains(&stored));
        // the last notification matches the value at rest
        assert_eq!(recorder.pushed.lock().last().unwrap().1, stored);
    }
}
