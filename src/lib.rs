//! mlld - executable markdown
//!
//! This library parses Markdown documents interleaved with directives,
//! interprets them against a scoped environment, and produces the final
//! Markdown artifact.

pub mod ast;
pub mod fs;
pub mod interpreter;
pub mod mlld;
pub mod parser;
pub mod pipeline;
pub mod resolver;
pub mod runtimes;
pub mod security;

pub use ast::types::*;
pub use fs::{FileSystem, InMemoryFs, OsFs};
pub use interpreter::{Environment, ErrorKind, Interpreter, MlldError};
pub use mlld::{Mlld, MlldOptions, RunResult};
pub use parser::{parse, parse_with_options, ParseException, ParseOptions, Parser};
pub use pipeline::{PipelineEvent, PipelineMachine, StageContext};
pub use resolver::{LocalResolver, ModuleResolver, ResolvedModule};
pub use runtimes::{Runtime, RuntimeRegistry};
