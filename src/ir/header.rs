//! C header generation.

use super::IrModule;
use crate::core::VariableType;
use std::fmt;

/// Declarations making up a public header, already rendered as C.
#[derive(Debug, Clone, Default)]
pub struct HeaderDeclarations {
    pub module_name: String,
    pub definitions: Vec<(String, String)>,
    /// Struct name and `(type, field)` pairs.
    pub structs: Vec<(String, Vec<(String, String)>)>,
    /// Complete prototypes without the trailing semicolon.
    pub prototypes: Vec<String>,
}

/// Render a prototype from C type names.
pub fn prototype(return_type: &str, name: &str, params: &[(String, String)]) -> String {
    let params: Vec<String> = params.iter().map(|(ty, name)| format!("{} {}", ty, name)).collect();
    let params = if params.is_empty() { "void".to_string() } else { params.join(", ") };
    format!("{} {}({})", return_type, name, params)
}

impl HeaderDeclarations {
    pub fn write<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        writeln!(out, "// {}", self.module_name)?;
        writeln!(out, "#pragma once")?;
        writeln!(out)?;
        writeln!(out, "#include <stdbool.h>")?;
        writeln!(out, "#include <stdint.h>")?;

        if !self.definitions.is_empty() {
            writeln!(out)?;
        }
        for (name, value) in &self.definitions {
            writeln!(out, "#define {} {}", name, value)?;
        }

        for (name, fields) in &self.structs {
            writeln!(out)?;
            writeln!(out, "typedef struct {}", name)?;
            writeln!(out, "{{")?;
            for (ty, field) in fields {
                writeln!(out, "    {} {};", ty, field)?;
            }
            writeln!(out, "}} {};", name)?;
        }

        writeln!(out)?;
        writeln!(out, "#if defined(__cplusplus)")?;
        writeln!(out, "extern \"C\"")?;
        writeln!(out, "{{")?;
        writeln!(out, "#endif")?;
        for prototype in &self.prototypes {
            writeln!(out, "{};", prototype)?;
        }
        writeln!(out, "#if defined(__cplusplus)")?;
        writeln!(out, "}} // extern \"C\"")?;
        writeln!(out, "#endif")
    }
}

fn c_type(module: &IrModule<'_>, ty: VariableType) -> String {
    match ty {
        VariableType::Struct(s) => module.struct_type(s).map(|s| s.name().to_string()).unwrap_or_else(|| "void".into()),
        VariableType::StructPointer(s) => format!("{}*", c_type(module, VariableType::Struct(s))),
        other => other.c_name().to_string(),
    }
}

/// Header declarations of everything the module tags for the header.
pub fn declarations(module: &IrModule<'_>) -> HeaderDeclarations {
    let structs = module
        .structs()
        .iter()
        .filter(|s| s.is_in_header())
        .map(|s| {
            let fields = s
                .fields()
                .iter()
                .map(|(name, ty)| (c_type(module, *ty), name.to_string()))
                .collect();
            (s.name().to_string(), fields)
        })
        .collect();
    let prototypes = module
        .functions()
        .iter()
        .filter(|f| f.is_in_header() || f.is_predict())
        .map(|f| {
            let params: Vec<(String, String)> = f
                .params()
                .iter()
                .map(|(name, ty)| (c_type(module, *ty), name.to_string()))
                .collect();
            prototype(&c_type(module, f.return_type()), f.name(), &params)
        })
        .collect();
    HeaderDeclarations {
        module_name: module.name().to_string(),
        definitions: module.preprocessor_definitions().to_vec(),
        structs,
        prototypes,
    }
}

/// Write the C header of a built-in IR module.
pub fn write_header<W: fmt::Write>(module: &IrModule<'_>, out: &mut W) -> fmt::Result {
    declarations(module).write(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prototype_rendering() {
        assert_eq!(prototype("int32_t", "model_GetInputSize", &[]), "int32_t model_GetInputSize(void)");
        assert_eq!(
            prototype(
                "void",
                "predict",
                &[("double*".into(), "input".into()), ("double*".into(), "output".into())]
            ),
            "void predict(double* input, double* output)"
        );
    }

    #[test]
    fn test_declarations_layout() {
        let declarations = HeaderDeclarations {
            module_name: "model".into(),
            definitions: vec![("model_PROFILING".into(), "1".into())],
            structs: vec![("TensorShape".into(), vec![("int32_t".into(), "rows".into())])],
            prototypes: vec!["int32_t model_GetNumNodes(void)".into()],
        };
        let mut out = String::new();
        declarations.write(&mut out).unwrap();
        assert!(out.starts_with("// model\n#pragma once\n"));
        assert!(out.contains("#define model_PROFILING 1\n"));
        assert!(out.contains("typedef struct TensorShape\n{\n    int32_t rows;\n} TensorShape;\n"));
        assert!(out.contains("int32_t model_GetNumNodes(void);\n"));
    }
}
