//! Tool descriptors, schema validation, and the tool registry.
//!
//! Tools are values: a [`ToolDescriptor`] describes the name, parameter
//! schema, and safety/resource flags; the [`ToolRegistry`] resolves a
//! descriptor's `function` handle to a stable [`Tool`] callable. There is
//! no runtime reflection anywhere in the dispatch path.

pub mod builtin;
pub mod descriptor;
pub mod registry;
pub mod tool;
pub mod validate;

pub use descriptor::{ParameterSchema, PropertySpec, ToolDescriptor};
pub use registry::ToolRegistry;
pub use tool::{FnTool, Tool, ToolError};
pub use validate::{validate_inputs, InputError};
