//! Worker and orchestrator source emission.
//!
//! The emitted layout under the output root is
//! `{message_package}/{service_snake}/{method_snake}/main.rs` per method,
//! `orchestrator/main.rs` for the entry point that spawns the fleet, and
//! `manifest.json` describing the binaries a packaging step must build.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::ident;
use crate::parser::{parse_service_file, ParsedService, ServiceMethod};
use crate::transform::rewrite_method_body;

/// Configuration for a generation run.
#[derive(Debug, Clone)]
pub struct CodegenConfig {
    /// Directory scanned for service files by [`build_dir`].
    pub src_dir: PathBuf,
    /// Root the generated tree is written under.
    pub output_dir: PathBuf,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            src_dir: PathBuf::from("./"),
            output_dir: PathBuf::from("./generated"),
        }
    }
}

/// One generated method, as recorded in the build manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub method_name: String,
    /// Fully qualified routing address.
    pub method_address: String,
    /// Binary name: hash prefix of the address joined to the method name.
    pub short_id: String,
    /// Source directory relative to the output root.
    pub dir: String,
}

/// The build manifest emitted alongside the generated sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub methods: Vec<MethodInfo>,
}

/// Generates one worker program per method of the given service file.
pub fn generate_from_service_file(
    service_path: &Path,
    config: &CodegenConfig,
) -> Result<Vec<MethodInfo>> {
    let parsed = parse_service_file(service_path)?;
    fs::create_dir_all(&config.output_dir)?;

    let mut methods = Vec::new();
    for method in &parsed.methods {
        let body = rewrite_method_body(&parsed, method);
        let content = worker_file_content(&parsed, method, &body);

        let rel_dir = ident::dir_path(&parsed.message_path, &parsed.service_name, &method.name);
        let out_dir = config.output_dir.join(&rel_dir);
        fs::create_dir_all(&out_dir)?;
        fs::write(out_dir.join("main.rs"), content)?;

        methods.push(MethodInfo {
            method_name: method.name.clone(),
            method_address: ident::method_address(
                &parsed.message_path,
                &parsed.service_name,
                &method.name,
            ),
            short_id: ident::short_method_id(
                &parsed.message_path,
                &parsed.service_name,
                &method.name,
            ),
            dir: rel_dir.to_string_lossy().into_owned(),
        });
    }

    Ok(methods)
}

/// Walks `src_dir` and generates for every parseable service file, then
/// emits the orchestrator entry and the manifest covering everything found.
pub fn build_dir(config: &CodegenConfig) -> Result<Vec<MethodInfo>> {
    fs::create_dir_all(&config.output_dir)?;

    let mut all = Vec::new();
    let mut entries: Vec<PathBuf> = fs::read_dir(&config.src_dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in entries {
        if !path.is_file() || path.extension().map_or(true, |e| e != "rs") {
            continue;
        }
        match generate_from_service_file(&path, config) {
            Ok(methods) => {
                info!(
                    file = %path.display(),
                    count = methods.len(),
                    "generated workers"
                );
                all.extend(methods);
            }
            Err(e) => {
                warn!(file = %path.display(), "skipping: {e}");
            }
        }
    }

    generate_orchestrator(&all, config)?;
    write_manifest(&all, config)?;
    Ok(all)
}

/// The complete worker program for one method: carried-over imports, the
/// method body as a free function, and an entry point that attaches the IO
/// node and blocks forever.
fn worker_file_content(parsed: &ParsedService, method: &ServiceMethod, body: &str) -> String {
    let mut out = String::new();
    out.push_str("use fission_node::{IoNode, RpcContext};\n");

    let mut emitted: HashSet<&str> = HashSet::new();
    for import in &parsed.imports {
        // The runtime preamble above replaces any fission_node import the
        // source file had.
        if import.path.starts_with("fission_node") {
            continue;
        }
        if !emitted.insert(&import.text) {
            continue;
        }

        let is_message = import.path == parsed.message_path;
        let referenced = body.contains(&import.name)
            || method.ret_type.contains(&import.name)
            || method.req_type.contains(&import.name)
            || method.ctx_type.contains(&import.name);
        if is_message || referenced {
            out.push_str(&import.text);
            out.push('\n');
        }
    }

    out.push('\n');
    out.push_str(&format!(
        "async fn {}({}: {}, {}: {}) -> {} {{{}}}\n",
        method.name,
        method.ctx_name,
        method.ctx_type,
        method.req_name,
        method.req_type,
        method.ret_type,
        body
    ));

    out.push('\n');
    out.push_str(concat!(
        "#[derive(argh::FromArgs)]\n",
        "/// Fission worker entry point.\n",
        "struct WorkerArgs {\n",
        "    /// unique id for this worker instance\n",
        "    #[argh(option, default = \"String::from(\\\"default-worker\\\")\")]\n",
        "    id: String,\n",
        "}\n",
        "\n",
        "#[tokio::main]\n",
        "async fn main() {\n",
        "    tracing_subscriber::fmt::init();\n",
        "    let args: WorkerArgs = argh::from_env();\n",
        "    let node = IoNode::attach(&args.id);\n",
        "    node.listen();\n",
    ));
    out.push_str(&format!("    node.handle({});\n", method.name));
    out.push_str("    std::future::pending::<()>().await;\n}\n");
    out
}

/// Emits `orchestrator/main.rs`: one `spawn` per generated method, then
/// block forever.
fn generate_orchestrator(methods: &[MethodInfo], config: &CodegenConfig) -> Result<()> {
    let mut out = String::new();
    out.push_str(concat!(
        "use fission_orchestrator::Orchestrator;\n",
        "\n",
        "#[tokio::main]\n",
        "async fn main() {\n",
        "    tracing_subscriber::fmt::init();\n",
        "    let orch = Orchestrator::new();\n",
        "\n",
    ));

    for method in methods {
        out.push_str(&format!(
            concat!(
                "    if let Err(e) = orch.spawn(\"{address}\", \"./{short_id}\", 1).await {{\n",
                "        tracing::error!(\"failed to spawn worker for {name}: {{e}}\");\n",
                "        std::process::exit(1);\n",
                "    }}\n",
            ),
            address = method.method_address,
            short_id = method.short_id,
            name = method.method_name,
        ));
    }

    out.push_str("\n    std::future::pending::<()>().await;\n}\n");

    let orch_dir = config.output_dir.join("orchestrator");
    fs::create_dir_all(&orch_dir)?;
    fs::write(orch_dir.join("main.rs"), out)?;
    Ok(())
}

/// Emits `manifest.json`: the facts a packaging step needs to build one
/// binary per method.
fn write_manifest(methods: &[MethodInfo], config: &CodegenConfig) -> Result<()> {
    let manifest = Manifest {
        methods: methods.to_vec(),
    };
    let json = serde_json::to_string_pretty(&manifest)?;
    fs::write(config.output_dir.join("manifest.json"), json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOK_SERVICE: &str = r#"
use fission_common::protocol::Status;
use fission_node::RpcContext;

use bookstore::messages as msgs;

pub struct BookService;

impl BookService {
    pub async fn get_book(&self, ctx: RpcContext, req: msgs::GetBookRequest) -> Result<msgs::GetBookResponse, Status> {
        let author = self.get_author(ctx.clone(), msgs::GetAuthorRequest { book_id: req.book_id.clone() }).await?;
        Ok(msgs::GetBookResponse { book_id: req.book_id, author: author.author })
    }

    pub async fn get_author(&self, ctx: RpcContext, req: msgs::GetAuthorRequest) -> Result<msgs::GetAuthorResponse, Status> {
        let _ = (ctx, req);
        Ok(msgs::GetAuthorResponse { author: "A".to_string() })
    }
}
"#;

    fn write_service(dir: &Path) -> PathBuf {
        let path = dir.join("book_service.rs");
        fs::write(&path, BOOK_SERVICE).unwrap();
        path
    }

    #[test]
    fn test_generates_one_worker_per_method() {
        let tmp = tempfile::tempdir().unwrap();
        let service = write_service(tmp.path());
        let config = CodegenConfig {
            src_dir: tmp.path().into(),
            output_dir: tmp.path().join("generated"),
        };

        let methods = generate_from_service_file(&service, &config).unwrap();
        assert_eq!(methods.len(), 2);

        let get_book = tmp
            .path()
            .join("generated/messages/book_service/get_book/main.rs");
        let get_author = tmp
            .path()
            .join("generated/messages/book_service/get_author/main.rs");
        assert!(get_book.exists());
        assert!(get_author.exists());
    }

    #[test]
    fn test_worker_file_shape() {
        let tmp = tempfile::tempdir().unwrap();
        let service = write_service(tmp.path());
        let config = CodegenConfig {
            src_dir: tmp.path().into(),
            output_dir: tmp.path().join("generated"),
        };
        generate_from_service_file(&service, &config).unwrap();

        let content = fs::read_to_string(
            tmp.path()
                .join("generated/messages/book_service/get_book/main.rs"),
        )
        .unwrap();

        // Free function, no receiver.
        assert!(content.contains("async fn get_book(ctx: RpcContext, req: msgs::GetBookRequest)"));
        assert!(!content.contains("&self"));
        // The sibling call is a typed remote invocation on the full address.
        assert!(content.contains("fission_node::call::<msgs::GetAuthorRequest, msgs::GetAuthorResponse>(\"bookstore::messages.BookService.get_author\""));
        // Imports carried over.
        assert!(content.contains("use bookstore::messages as msgs;"));
        assert!(content.contains("use fission_common::protocol::Status;"));
        // Entry point wiring.
        assert!(content.contains("async fn main()"));
        assert!(content.contains("IoNode::attach(&args.id)"));
        assert!(content.contains("node.listen();"));
        assert!(content.contains("node.handle(get_book);"));
        assert!(content.contains("default-worker"));
    }

    #[test]
    fn test_build_dir_emits_orchestrator_and_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        write_service(&src);
        let config = CodegenConfig {
            src_dir: src,
            output_dir: tmp.path().join("generated"),
        };

        let methods = build_dir(&config).unwrap();
        assert_eq!(methods.len(), 2);

        let orch = fs::read_to_string(tmp.path().join("generated/orchestrator/main.rs")).unwrap();
        for method in &methods {
            assert!(orch.contains(&format!(
                "orch.spawn(\"{}\", \"./{}\", 1)",
                method.method_address, method.short_id
            )));
        }

        let manifest: Manifest = serde_json::from_str(
            &fs::read_to_string(tmp.path().join("generated/manifest.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(manifest.methods, methods);
    }

    #[test]
    fn test_build_dir_skips_unparseable_files() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        write_service(&src);
        fs::write(src.join("notes.rs"), "fn free_function() {}").unwrap();
        fs::write(src.join("readme.txt"), "not rust").unwrap();

        let config = CodegenConfig {
            src_dir: src,
            output_dir: tmp.path().join("generated"),
        };
        let methods = build_dir(&config).unwrap();
        assert_eq!(methods.len(), 2);
    }

    /// Generating twice from the same source produces identical ids.
    #[test]
    fn test_generation_is_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        let service = write_service(tmp.path());
        let config_a = CodegenConfig {
            src_dir: tmp.path().into(),
            output_dir: tmp.path().join("gen_a"),
        };
        let config_b = CodegenConfig {
            src_dir: tmp.path().into(),
            output_dir: tmp.path().join("gen_b"),
        };

        let a = generate_from_service_file(&service, &config_a).unwrap();
        let b = generate_from_service_file(&service, &config_b).unwrap();
        assert_eq!(a, b);
    }
}
