//! WASM runtime implementation using wasmtime.
//!
//! Uses wasmtime-wasi preview1 so modules built for `wasm32-wasip1` link.

use super::config::{WasiCapabilities, WasmConfig};
use super::host_functions::BridgeHostFunctions;
use crate::adapter::CallbackAdapters;
use crate::error::{BridgeError, Result};
use crate::module::ComputationModule;

use std::path::Path;
use std::time::Instant;

use wasmtime::*;

/// Host state for the WASM store.
pub struct WasmHostState {
    preview1: wasmtime_wasi::preview1::WasiP1Ctx,
    limits: StoreLimits,
    callbacks: Option<CallbackAdapters>,
}

impl WasmHostState {
    /// Get the preview1 context.
    fn preview1(&mut self) -> &mut wasmtime_wasi::preview1::WasiP1Ctx {
        &mut self.preview1
    }

    /// Adapters bound for the processing call in progress.
    pub(crate) fn callbacks(&self) -> Result<&CallbackAdapters> {
        self.callbacks.as_ref().ok_or_else(|| {
            BridgeError::WasmError("callback invoked outside of a processing call".to_string())
        })
    }
}

/// Compiles and instantiates computation modules.
pub struct WasmRuntime {
    engine: Engine,
    config: WasmConfig,
}

/// A compiled computation module.
pub struct WasmModule {
    module: Module,
    name: String,
}

/// An instantiated computation module ready to process files.
pub struct WasmInstance {
    store: Store<WasmHostState>,
    instance: Instance,
    entry_point: String,
    fuel_limit: Option<u64>,
}

impl WasmRuntime {
    /// Create a runtime with the given configuration.
    pub fn new(config: WasmConfig) -> Result<Self> {
        let mut engine_config = Config::new();

        engine_config.cranelift_opt_level(match config.optimization_level {
            0 => OptLevel::None,
            1 => OptLevel::Speed,
            _ => OptLevel::SpeedAndSize,
        });
        engine_config.wasm_simd(config.enable_simd);

        if config.fuel_limit.is_some() {
            engine_config.consume_fuel(true);
        }

        if let Some(ref cache_path) = config.cache_path {
            if let Err(e) = engine_config.cache_config_load(cache_path) {
                tracing::warn!("Failed to load cache config: {}", e);
            }
        }

        let engine = Engine::new(&engine_config)
            .map_err(|e| BridgeError::WasmError(format!("engine creation failed: {}", e)))?;

        Ok(Self { engine, config })
    }

    /// Compile a module from a file (binary or text format).
    pub fn load_module(&self, path: impl AsRef<Path>) -> Result<WasmModule> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        let module = Module::from_file(&self.engine, path)
            .map_err(|e| BridgeError::ModuleLoad(format!("{}: {}", path.display(), e)))?;

        Ok(WasmModule { module, name })
    }

    /// Compile a module from bytes (binary or text format).
    pub fn load_module_bytes(&self, name: &str, bytes: &[u8]) -> Result<WasmModule> {
        let module = Module::new(&self.engine, bytes)
            .map_err(|e| BridgeError::ModuleLoad(format!("{}: {}", name, e)))?;

        Ok(WasmModule {
            module,
            name: name.to_string(),
        })
    }

    /// Instantiate a module against WASI and the bridge host functions.
    pub fn instantiate(&self, module: &WasmModule) -> Result<WasmInstance> {
        let host_state = self.build_host_state(&self.config.capabilities)?;
        let mut store = Store::new(&self.engine, host_state);

        store.limiter(|state| &mut state.limits);

        if let Some(fuel) = self.config.fuel_limit {
            store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::WasmError(format!("fuel setup failed: {}", e)))?;
        }

        let mut linker: Linker<WasmHostState> = Linker::new(&self.engine);
        wasmtime_wasi::preview1::add_to_linker_sync(&mut linker, |state| state.preview1())
            .map_err(|e| BridgeError::WasmError(format!("WASI link failed: {}", e)))?;

        BridgeHostFunctions::register(&mut linker, &self.config.import_namespace)?;

        let instance = linker
            .instantiate(&mut store, &module.module)
            .map_err(|e| {
                BridgeError::ModuleLoad(format!("{}: instantiation failed: {}", module.name, e))
            })?;

        Ok(WasmInstance {
            store,
            instance,
            entry_point: self.config.entry_point.clone(),
            fuel_limit: self.config.fuel_limit,
        })
    }

    /// Build host state from capabilities.
    fn build_host_state(&self, caps: &WasiCapabilities) -> Result<WasmHostState> {
        let mut builder = wasmtime_wasi::WasiCtxBuilder::new();

        if caps.stdin {
            builder.inherit_stdin();
        }
        if caps.stdout {
            builder.inherit_stdout();
        }
        if caps.stderr {
            builder.inherit_stderr();
        }

        for (key, value) in &caps.env_vars {
            builder.env(key, value);
        }

        builder.args(&caps.args);

        for dir in &caps.preopened_dirs_ro {
            builder
                .preopened_dir(
                    dir,
                    dir.to_string_lossy(),
                    wasmtime_wasi::DirPerms::READ,
                    wasmtime_wasi::FilePerms::READ,
                )
                .map_err(|e| {
                    BridgeError::WasmError(format!("failed to open dir {:?}: {}", dir, e))
                })?;
        }

        let preview1 = builder.build_p1();

        let limits = StoreLimitsBuilder::new()
            .memory_size(self.config.max_memory)
            .build();

        Ok(WasmHostState {
            preview1,
            limits,
            callbacks: None,
        })
    }
}

impl WasmModule {
    /// Get the module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get exported function names.
    pub fn exports(&self) -> impl Iterator<Item = &str> {
        self.module.exports().filter_map(|e| {
            if matches!(e.ty(), ExternType::Func(_)) {
                Some(e.name())
            } else {
                None
            }
        })
    }
}

impl WasmInstance {
    /// Run the module's own entry point, if it has one.
    ///
    /// Reactors export `_initialize`, commands export `_start`. A command that
    /// leaves through `proc_exit(0)` has started successfully.
    pub fn start(&mut self) -> Result<()> {
        let name = if self.has_func("_initialize") {
            "_initialize"
        } else if self.has_func("_start") {
            "_start"
        } else {
            return Ok(());
        };

        let start = Instant::now();
        let func = self.get_typed_func::<(), ()>(name)?;
        match func.call(&mut self.store, ()) {
            Ok(()) => {}
            Err(e) => match e.downcast_ref::<wasmtime_wasi::I32Exit>() {
                Some(exit) if exit.0 == 0 => {}
                _ => {
                    return Err(BridgeError::ModuleLoad(format!("{} failed: {}", name, e)));
                }
            },
        }

        tracing::debug!(
            entry = name,
            elapsed_us = start.elapsed().as_micros() as u64,
            "module entry point finished"
        );
        Ok(())
    }

    fn has_func(&mut self, name: &str) -> bool {
        self.instance.get_func(&mut self.store, name).is_some()
    }

    /// Get a typed function from the instance.
    fn get_typed_func<P, R>(&mut self, name: &str) -> Result<TypedFunc<P, R>>
    where
        P: WasmParams,
        R: WasmResults,
    {
        self.instance
            .get_typed_func::<P, R>(&mut self.store, name)
            .map_err(|e| BridgeError::WasmError(format!("function '{}' not found: {}", name, e)))
    }

    /// Write bytes to WASM memory at the given offset.
    pub fn write_memory(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let memory = self.get_memory()?;
        let mem_data = memory.data_mut(&mut self.store);

        let end = offset
            .checked_add(data.len())
            .filter(|end| *end <= mem_data.len())
            .ok_or_else(|| BridgeError::WasmError("memory write out of bounds".to_string()))?;

        mem_data[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Get the memory export.
    fn get_memory(&mut self) -> Result<Memory> {
        self.instance
            .get_memory(&mut self.store, "memory")
            .ok_or_else(|| BridgeError::WasmError("no memory export found".to_string()))
    }

    /// Allocate memory in the module (requires the module to export `alloc`).
    pub fn alloc(&mut self, size: i32) -> Result<i32> {
        let func = self.get_typed_func::<i32, i32>("alloc")?;
        func.call(&mut self.store, size)
            .map_err(|e| BridgeError::WasmError(format!("alloc failed: {}", e)))
    }

    /// Free memory in the module, if it exports `dealloc`.
    pub fn dealloc(&mut self, ptr: i32, size: i32) -> Result<()> {
        if !self.has_func("dealloc") {
            return Ok(());
        }
        let func = self.get_typed_func::<(i32, i32), ()>("dealloc")?;
        func.call(&mut self.store, (ptr, size))
            .map_err(|e| BridgeError::WasmError(format!("dealloc failed: {}", e)))
    }

    /// Free a buffer on a path that already has an outcome to report.
    fn release(&mut self, ptr: i32, size: i32) {
        if let Err(e) = self.dealloc(ptr, size) {
            tracing::warn!("failed to free module buffer: {}", e);
        }
    }

    /// Copy a buffer into freshly allocated module memory.
    fn copy_in(&mut self, bytes: &[u8]) -> Result<(i32, i32)> {
        let len = i32::try_from(bytes.len())
            .map_err(|_| BridgeError::WasmError(format!("{} bytes exceed wasm32", bytes.len())))?;
        let ptr = self.alloc(len)?;
        if let Err(e) = self.write_memory(ptr as u32 as usize, bytes) {
            self.release(ptr, len);
            return Err(e);
        }
        Ok((ptr, len))
    }

    /// Restore the per-call fuel budget.
    fn refuel(&mut self) -> Result<()> {
        if let Some(fuel) = self.fuel_limit {
            self.store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::WasmError(format!("fuel setup failed: {}", e)))?;
        }
        Ok(())
    }

    /// Get remaining fuel (if fuel metering enabled).
    pub fn remaining_fuel(&self) -> Option<u64> {
        self.store.get_fuel().ok()
    }
}

impl ComputationModule for WasmInstance {
    fn process_file(
        &mut self,
        file_name: &str,
        bytes: &[u8],
        callbacks: &CallbackAdapters,
    ) -> Result<()> {
        let entry = self.entry_point.clone();
        let func = self.get_typed_func::<(i32, i32, i32, i32), ()>(&entry)?;
        self.refuel()?;

        let (name_ptr, name_len) = self.copy_in(file_name.as_bytes())?;
        let (data_ptr, data_len) = match self.copy_in(bytes) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.release(name_ptr, name_len);
                return Err(e);
            }
        };

        self.store.data_mut().callbacks = Some(callbacks.clone());
        let start = Instant::now();
        let fuel_before = self.store.get_fuel().ok();

        let result = func.call(&mut self.store, (name_ptr, name_len, data_ptr, data_len));

        self.store.data_mut().callbacks = None;
        let fuel_after = self.store.get_fuel().ok();
        tracing::debug!(
            file = file_name,
            elapsed_us = start.elapsed().as_micros() as u64,
            fuel_consumed = ?fuel_before.zip(fuel_after).map(|(b, a)| b - a),
            "{} returned",
            entry
        );

        self.release(data_ptr, data_len);
        self.release(name_ptr, name_len);

        result.map_err(|e| BridgeError::WasmError(format!("{} trapped: {}", entry, e)))
    }
}
