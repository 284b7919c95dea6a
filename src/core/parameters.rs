// This module holds the configuration recognized by the map compiler. MapCompilerParameters
// carries the module name (which doubles as the prefix of every public accessor), the name
// of the generated predict function, and the profiling switch. CompilerSettings carries the
// emitter-facing options: the target device (triple and data layout stamped onto the
// finished module) and whether emitted blocks are annotated with the identity of the node
// that produced them. Everything has a Default so callers only override what they need;
// the mapc binary fills these structs from its command line flags.

//! Map compiler configuration.

/// Target platform descriptors stamped on the finished module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDevice {
    pub device_name: String,
    pub triple: String,
    pub data_layout: String,
}

impl Default for TargetDevice {
    fn default() -> Self {
        Self {
            device_name: "host".to_string(),
            triple: "x86_64-pc-linux-gnu".to_string(),
            data_layout: "e-m:e-p270:32:32-p271:32:32-p272:64:64-i64:64-i128:128-f80:128-n8:16:32:64-S128"
                .to_string(),
        }
    }
}

/// Options consumed by the low-level emitter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerSettings {
    pub target_device: TargetDevice,
    /// Print each node's identity at the start of its code region.
    pub include_diagnostic_info: bool,
}

/// Options consumed by the map compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapCompilerParameters {
    /// Module name, also the prefix of the public accessor functions.
    pub module_name: String,
    /// Name of the generated predict function.
    pub map_function_name: String,
    /// Instrument model and node entry/exit.
    pub profile: bool,
    pub compiler_settings: CompilerSettings,
}

impl Default for MapCompilerParameters {
    fn default() -> Self {
        Self {
            module_name: "model".to_string(),
            map_function_name: "predict".to_string(),
            profile: false,
            compiler_settings: CompilerSettings::default(),
        }
    }
}

impl MapCompilerParameters {
    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }

    pub fn with_function_name(mut self, name: impl Into<String>) -> Self {
        self.map_function_name = name.into();
        self
    }

    pub fn with_profiling(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_diagnostic_info(mut self, enabled: bool) -> Self {
        self.compiler_settings.include_diagnostic_info = enabled;
        self
    }

    pub fn with_target_device(mut self, device: TargetDevice) -> Self {
        self.compiler_settings.target_device = device;
        self
    }
}
