//! Fission Code Generation
//!
//! Turns a service source file into a fleet of standalone worker programs.
//!
//! Given a file defining an inherent `impl` on a type whose name ends in
//! `Service`, with methods of the shape
//!
//! ```ignore
//! pub async fn get_book(&self, ctx: RpcContext, req: msgs::GetBookRequest)
//!     -> Result<msgs::GetBookResponse, Status>
//! ```
//!
//! the generator emits, per method, a `main.rs` containing the method body
//! as a free function with every sibling call (`self.get_author(...)`)
//! rewritten into a typed remote invocation through the worker runtime, plus
//! an orchestrator entry point that spawns one worker per method and a
//! `manifest.json` describing the produced binaries.
//!
//! The rewrite is byte-accurate: everything outside the rewritten call
//! expressions is carried over verbatim, comments and whitespace included.

pub mod emit;
pub mod error;
pub mod ident;
pub mod parser;
pub mod transform;

pub use emit::{build_dir, generate_from_service_file, CodegenConfig, Manifest, MethodInfo};
pub use error::CodegenError;
pub use parser::{parse_service_file, parse_service_str, ParsedService, ServiceMethod};
