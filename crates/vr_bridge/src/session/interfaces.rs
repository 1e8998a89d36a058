//! Generation-tagged cache of runtime interface tables

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;
use thiserror::Error;

use crate::runtime::{
    fn_table_name, RuntimeInterface, VrCompositor, VrRuntime, VrSystem, COMPOSITOR_INTERFACE_VERSION,
    SYSTEM_INTERFACE_VERSION,
};

/// Interface lookup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterfaceError {
    /// The runtime could not provide the table
    #[error("VR interface {name} unavailable: {reason}")]
    Unavailable {
        /// Requested table name
        name: String,
        /// Runtime's error description
        reason: String,
    },

    /// The runtime returned a different kind of table
    #[error("VR interface {name} resolved to a {found} table")]
    WrongKind {
        /// Requested table name
        name: String,
        /// Kind actually returned
        found: &'static str,
    },
}

/// Resolved interface tables, valid for one runtime token
///
/// Every accessor compares the runtime's current token with the one the
/// entries were resolved under and drops all entries on mismatch.
#[derive(Debug, Default)]
pub struct InterfaceCache {
    token: Option<u32>,
    entries: HashMap<String, RuntimeInterface>,
}

impl InterfaceCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached tables
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Token the entries belong to
    pub const fn token(&self) -> Option<u32> {
        self.token
    }

    /// Drop every entry and adopt `token`
    pub fn reset(&mut self, token: Option<u32>) {
        self.entries.clear();
        self.token = token;
    }

    fn check_token<R: VrRuntime + ?Sized>(&mut self, runtime: &R) {
        let current = runtime.init_token();
        if self.token != Some(current) {
            if !self.entries.is_empty() {
                debug!("Clearing VR interfaces");
            }
            self.reset(Some(current));
        }
    }

    /// Token-checked lookup of a table by interface version
    pub fn get<R: VrRuntime + ?Sized>(&mut self, runtime: &R, version: &str) -> Result<RuntimeInterface, InterfaceError> {
        self.check_token(runtime);
        let name = fn_table_name(version);
        if let Some(interface) = self.entries.get(&name) {
            return Ok(interface.clone());
        }

        let interface = runtime.get_generic_interface(&name).map_err(|code| InterfaceError::Unavailable {
            name: name.clone(),
            reason: runtime.error_description(code),
        })?;
        debug!("Resolved VR interface {}", name);
        self.entries.insert(name, interface.clone());
        Ok(interface)
    }

    /// The system table
    pub fn system<R: VrRuntime + ?Sized>(&mut self, runtime: &R) -> Result<Rc<dyn VrSystem>, InterfaceError> {
        match self.get(runtime, SYSTEM_INTERFACE_VERSION)? {
            RuntimeInterface::System(system) => Ok(system),
            other => Err(InterfaceError::WrongKind { name: fn_table_name(SYSTEM_INTERFACE_VERSION), found: other.kind() }),
        }
    }

    /// The compositor table
    pub fn compositor<R: VrRuntime + ?Sized>(&mut self, runtime: &R) -> Result<Rc<dyn VrCompositor>, InterfaceError> {
        match self.get(runtime, COMPOSITOR_INTERFACE_VERSION)? {
            RuntimeInterface::Compositor(compositor) => Ok(compositor),
            other => Err(InterfaceError::WrongKind {
                name: fn_table_name(COMPOSITOR_INTERFACE_VERSION),
                found: other.kind(),
            }),
        }
    }
}
