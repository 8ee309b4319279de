//! A single named script execution context.
//!
//! Each [`Runtime`] owns one interpreter behind a mutex. Every public
//! operation holds that lock for its full duration, so operations on one
//! runtime are totally ordered while separate runtimes run in parallel.
//! Callers block while waiting; nothing here times out.
//!
//! Host functions and event processors run while the lock is held. They
//! must not call back into the same runtime.

use crate::bindings;
use crate::bootstrap;
use crate::error::{RuntimeError, RuntimeResult};
use crate::events::{subscription_id, EventProcessor, Subscriber, Subscription};
use crate::value::{to_lua_args, ApiValue};
use ate_capability::CapabilitySurface;
use mlua::{Function, Lua, LuaOptions, LuaSerdeExt, StdLib, Table, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Per-runtime settings.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Interpreter memory ceiling in bytes.
    pub memory_limit: Option<usize>,

    /// Whether to load the `network` bootstrap script.
    pub load_network_bootstrap: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            memory_limit: None,
            load_network_bootstrap: true,
        }
    }
}

/// An isolated interpreter with the capability surface bound in.
pub struct Runtime {
    name: String,
    vm: Mutex<Option<Lua>>,
    processor: Arc<dyn EventProcessor>,
    subscriptions: Mutex<HashMap<String, Arc<dyn Subscriber>>>,
}

/// A resolved function, with its receiver when called as a method.
enum Callable {
    Function(Function),
    Method { receiver: Table, function: Function },
}

impl Callable {
    fn invoke(
        &self,
        lua: &Lua,
        runtime: &str,
        label: &str,
        args: &[serde_json::Value],
    ) -> RuntimeResult<serde_json::Value> {
        let (function, receiver) = match self {
            Callable::Function(f) => (f, None),
            Callable::Method { receiver, function } => {
                (function, Some(Value::Table(receiver.clone())))
            }
        };

        let args = to_lua_args(lua, receiver, args)
            .map_err(|e| RuntimeError::Conversion(format!("arguments to '{label}': {e}")))?;

        let result = function.call::<Value>(args).map_err(|e| {
            warn!(runtime = %runtime, "Call to '{}' failed: {}", label, e);
            RuntimeError::execution(runtime, e)
        })?;

        lua.from_value::<serde_json::Value>(result)
            .map_err(|e| RuntimeError::Export(format!("result of '{label}': {e}")))
    }
}

impl Runtime {
    /// Create and initialize a runtime.
    ///
    /// Initialization binds the event primitives, `RuntimeId` and the
    /// capability surface, then loads the bootstrap scripts. It runs
    /// exactly once, before any caller can reach the interpreter.
    pub fn new(
        name: impl Into<String>,
        surface: &CapabilitySurface,
        processor: Arc<dyn EventProcessor>,
        options: &RuntimeOptions,
    ) -> RuntimeResult<Arc<Self>> {
        let name = name.into();
        let libs = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8 | StdLib::COROUTINE;
        let lua = Lua::new_with(libs, LuaOptions::default())
            .map_err(|e| RuntimeError::execution(&name, e))?;

        if let Some(limit) = options.memory_limit {
            lua.set_memory_limit(limit)
                .map_err(|e| RuntimeError::execution(&name, e))?;
        }

        let runtime = Arc::new(Self {
            name,
            vm: Mutex::new(Some(lua)),
            processor,
            subscriptions: Mutex::new(HashMap::new()),
        });
        runtime.init(Arc::downgrade(&runtime), surface, options)?;
        Ok(runtime)
    }

    fn init(
        &self,
        this: Weak<Runtime>,
        surface: &CapabilitySurface,
        options: &RuntimeOptions,
    ) -> RuntimeResult<()> {
        self.with_vm(|lua| {
            let protected = lua
                .create_table()
                .and_then(|protected| {
                    bindings::strip_unsafe_globals(lua)?;
                    self.bind_event_primitives(lua, &protected, this)?;
                    protected.set("RuntimeId", self.name.as_str())?;
                    bindings::install_capabilities(lua, &protected, &self.name, surface)?;
                    Ok(protected)
                })
                .map_err(|e| RuntimeError::execution(&self.name, e))?;
            bindings::guard_globals(lua, protected)
                .map_err(|e| RuntimeError::execution(&self.name, e))?;

            for script in bootstrap::scripts(options.load_network_bootstrap) {
                match lua.load(script.source).set_name(script.name).exec() {
                    Ok(()) => debug!(runtime = %self.name, "Loaded bootstrap script {}", script.name),
                    Err(e) => warn!(
                        runtime = %self.name,
                        "Error while loading bootstrap script {}: {}",
                        script.name,
                        e
                    ),
                }
            }
            Ok(())
        })
    }

    fn bind_event_primitives(
        &self,
        lua: &Lua,
        protected: &Table,
        this: Weak<Runtime>,
    ) -> mlua::Result<()> {
        let processor = Arc::clone(&self.processor);
        let owner = this.clone();
        let name = self.name.clone();
        protected.set(
            "events_subscribe",
            lua.create_function(
                move |_, (source, event_type, target, id): (String, String, String, String)| {
                    let expected = subscription_id(&name, &source, &event_type);
                    if id != expected {
                        return Err(mlua::Error::RuntimeError(format!(
                            "subscription id '{id}' does not match '{expected}'"
                        )));
                    }
                    let Some(runtime) = owner.upgrade() else {
                        return Ok(());
                    };
                    let subscription: Arc<dyn Subscriber> = Arc::new(Subscription::new(
                        source,
                        event_type,
                        target,
                        id.clone(),
                        owner.clone(),
                    ));
                    runtime
                        .subscriptions
                        .lock()
                        .insert(id, Arc::clone(&subscription));
                    processor.subscribe(subscription);
                    Ok(())
                },
            )?,
        )?;

        let processor = Arc::clone(&self.processor);
        protected.set(
            "events_unsubscribe",
            lua.create_function(move |_, id: String| {
                let removed = this
                    .upgrade()
                    .and_then(|runtime| runtime.subscriptions.lock().remove(&id));
                if let Some(subscription) = removed {
                    processor.withdraw(&subscription);
                }
                Ok(())
            })?,
        )?;
        Ok(())
    }

    /// Run `f` against the interpreter while holding the runtime lock.
    fn with_vm<R>(&self, f: impl FnOnce(&Lua) -> RuntimeResult<R>) -> RuntimeResult<R> {
        let guard = self.vm.lock();
        match guard.as_ref() {
            Some(lua) => f(lua),
            None => Err(RuntimeError::Shutdown(self.name.clone())),
        }
    }

    /// The runtime's name, also bound as `RuntimeId`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read a script file and execute it.
    pub fn load_script_file(&self, path: impl AsRef<Path>) -> RuntimeResult<()> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        self.add_named_script(&format!("@{}", path.display()), &source)
    }

    /// Load files in order, stopping at the first failure.
    pub fn load_script_files<I, P>(&self, paths: I) -> RuntimeResult<()>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            self.load_script_file(path)?;
        }
        Ok(())
    }

    /// Expose a host value or function to scripts under `name`.
    pub fn bind_script_object(&self, name: &str, value: ApiValue) -> RuntimeResult<()> {
        if bindings::is_protected(name) {
            return Err(RuntimeError::ReadOnlyBinding(name.to_string()));
        }
        self.with_vm(|lua| {
            let value = value
                .to_lua(lua)
                .map_err(|e| RuntimeError::Conversion(format!("binding '{name}': {e}")))?;
            lua.globals()
                .set(name, value)
                .map_err(|e| RuntimeError::execution(&self.name, e))
        })
    }

    /// Execute source text in the global scope.
    pub fn add_script(&self, source: &str) -> RuntimeResult<()> {
        self.add_named_script("=script", source)
    }

    /// Execute source text, naming the chunk in error messages.
    pub fn add_named_script(&self, chunk_name: &str, source: &str) -> RuntimeResult<()> {
        self.with_vm(|lua| {
            lua.load(source).set_name(chunk_name).exec().map_err(|e| {
                warn!(runtime = %self.name, "Script {} failed: {}", chunk_name, e);
                RuntimeError::execution(&self.name, e)
            })
        })
    }

    /// Call a global function and export its first return value.
    pub fn call_func(
        &self,
        func_name: &str,
        args: &[serde_json::Value],
    ) -> RuntimeResult<serde_json::Value> {
        self.with_vm(|lua| {
            let callable = resolve_function(lua, func_name)?;
            callable.invoke(lua, &self.name, func_name, args)
        })
    }

    /// Call `obj_name:func_name(args...)` and export its first return value.
    pub fn call_func_on_obj(
        &self,
        obj_name: &str,
        func_name: &str,
        args: &[serde_json::Value],
    ) -> RuntimeResult<serde_json::Value> {
        self.with_vm(|lua| {
            let callable = resolve_method(lua, obj_name, func_name)?;
            callable.invoke(lua, &self.name, &format!("{obj_name}:{func_name}"), args)
        })
    }

    /// Whether a global with this name is currently defined.
    pub fn has_global(&self, name: &str) -> RuntimeResult<bool> {
        self.with_vm(|lua| {
            let value: Value = lua
                .globals()
                .get(name)
                .map_err(|e| RuntimeError::execution(&self.name, e))?;
            Ok(!value.is_nil())
        })
    }

    /// Ids of the subscriptions this runtime currently holds.
    pub fn subscription_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.subscriptions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether [`Runtime::shutdown`] has run.
    pub fn is_shut_down(&self) -> bool {
        self.vm.lock().is_none()
    }

    /// Drop the interpreter and withdraw every subscription it still owns.
    ///
    /// A subscription that another subscriber has since replaced under the
    /// same id stays with the processor.
    ///
    /// Later operations fail with [`RuntimeError::Shutdown`]. Calling this
    /// twice is harmless.
    pub fn shutdown(&self) {
        let vm = self.vm.lock().take();
        if vm.is_none() {
            return;
        }
        drop(vm);

        let owned: Vec<_> = self.subscriptions.lock().drain().map(|(_, sub)| sub).collect();
        for subscription in &owned {
            self.processor.withdraw(subscription);
        }
        info!(runtime = %self.name, subscriptions = owned.len(), "Runtime shut down");
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("name", &self.name)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

fn resolve_function(lua: &Lua, name: &str) -> RuntimeResult<Callable> {
    let value: Value = lua
        .globals()
        .get(name)
        .map_err(|e| RuntimeError::Resolution(format!("{name}: {e}")))?;
    match value {
        Value::Function(f) => Ok(Callable::Function(f)),
        Value::Nil => Err(RuntimeError::Resolution(format!("function '{name}' is not defined"))),
        other => Err(RuntimeError::NotCallable(format!(
            "'{name}' is a {}, not a function",
            other.type_name()
        ))),
    }
}

fn resolve_method(lua: &Lua, obj_name: &str, func_name: &str) -> RuntimeResult<Callable> {
    let value: Value = lua
        .globals()
        .get(obj_name)
        .map_err(|e| RuntimeError::Resolution(format!("{obj_name}: {e}")))?;
    let receiver = match value {
        Value::Table(t) => t,
        Value::Nil => {
            return Err(RuntimeError::Resolution(format!(
                "object '{obj_name}' is not defined"
            )))
        }
        other => {
            return Err(RuntimeError::NotCallable(format!(
                "'{obj_name}' is a {}, not an object",
                other.type_name()
            )))
        }
    };

    let method: Value = receiver
        .get(func_name)
        .map_err(|e| RuntimeError::Resolution(format!("{obj_name}.{func_name}: {e}")))?;
    match method {
        Value::Function(function) => Ok(Callable::Method { receiver, function }),
        Value::Nil => Err(RuntimeError::Resolution(format!(
            "method '{obj_name}:{func_name}' is not defined"
        ))),
        other => Err(RuntimeError::NotCallable(format!(
            "'{obj_name}.{func_name}' is a {}, not a function",
            other.type_name()
        ))),
    }
}
