//! Service file parsing.
//!
//! Extracts, from one Rust source file, the service type, each RPC method's
//! signature, the imports that resolve the message types, and the positions
//! of sibling-method calls inside each method body. All positions are byte
//! offsets into the original source so the transformer can splice
//! replacements without disturbing surrounding text.

use std::collections::HashSet;
use std::path::Path;

use proc_macro2::Span;
use syn::spanned::Spanned;
use syn::visit::Visit;

use crate::error::{CodegenError, Result};

/// One leaf of a `use` item: the name it binds and the path it names.
#[derive(Debug, Clone)]
pub struct UseItem {
    /// Verbatim source text of the whole `use` item.
    pub text: String,
    /// The name this item binds in the module: the rename when present,
    /// else the final path segment.
    pub name: String,
    /// The full path as written, e.g. `bookstore::messages`.
    pub path: String,
    /// Whether `name` comes from an explicit `as` rename.
    pub renamed: bool,
}

/// A call to a sibling service method found inside a method body.
#[derive(Debug, Clone)]
pub struct CallSite {
    /// Name of the sibling method being called.
    pub method: String,
    /// Verbatim source text of the context argument.
    pub ctx_arg: String,
    /// Verbatim source text of the request argument.
    pub req_arg: String,
    /// Byte range of the full call expression, receiver through closing
    /// parenthesis.
    pub start: usize,
    pub end: usize,
}

/// One RPC method of the service: signature pieces as verbatim source text
/// plus the body's byte range (exclusive of the braces).
#[derive(Debug, Clone)]
pub struct ServiceMethod {
    pub name: String,
    /// The receiver identifier sibling calls are matched against.
    pub receiver_name: String,
    pub ctx_name: String,
    pub ctx_type: String,
    pub req_name: String,
    pub req_type: String,
    /// The success type inside the method's `Result` return.
    pub resp_type: String,
    /// The full return type as written.
    pub ret_type: String,
    pub body_start: usize,
    pub body_end: usize,
    pub calls: Vec<CallSite>,
}

/// Everything the transformer needs from one service file.
#[derive(Debug, Clone)]
pub struct ParsedService {
    pub source: String,
    pub service_name: String,
    pub imports: Vec<UseItem>,
    pub methods: Vec<ServiceMethod>,
    /// The resolved path of the module defining the request and response
    /// types.
    pub message_path: String,
}

impl ParsedService {
    pub fn method(&self, name: &str) -> Option<&ServiceMethod> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn method_names(&self) -> Vec<String> {
        self.methods.iter().map(|m| m.name.clone()).collect()
    }
}

/// Parses a service file from disk.
pub fn parse_service_file(path: &Path) -> Result<ParsedService> {
    let source = std::fs::read_to_string(path)?;
    parse_service_str(&source)
}

/// Parses service source text.
///
/// A method is included iff it has a `&self` receiver, exactly two further
/// parameters (context then request), and a `Result` return type. The
/// service is the first inherent impl on a type whose name ends in
/// `Service`.
pub fn parse_service_str(source: &str) -> Result<ParsedService> {
    let file = syn::parse_file(source)?;

    let mut imports = Vec::new();
    for item in &file.items {
        if let syn::Item::Use(item_use) = item {
            let text = span_text(source, item_use.span()).to_string();
            flatten_use_tree(&item_use.tree, &mut Vec::new(), &text, &mut imports);
        }
    }

    let service_impl = file
        .items
        .iter()
        .find_map(|item| match item {
            syn::Item::Impl(item_impl) if item_impl.trait_.is_none() => {
                let name = impl_type_name(item_impl)?;
                name.ends_with("Service").then_some((name, item_impl))
            }
            _ => None,
        })
        .ok_or(CodegenError::NoService)?;
    let (service_name, item_impl) = service_impl;

    let mut methods = Vec::new();
    for item in &item_impl.items {
        let syn::ImplItem::Fn(f) = item else { continue };
        if let Some(method) = extract_method(source, f) {
            methods.push(method);
        }
    }
    if methods.is_empty() {
        return Err(CodegenError::NoMethods);
    }

    let names: HashSet<String> = methods.iter().map(|m| m.name.clone()).collect();
    for item in &item_impl.items {
        let syn::ImplItem::Fn(f) = item else { continue };
        let method_name = f.sig.ident.to_string();
        let Some(method) = methods.iter_mut().find(|m| m.name == method_name) else {
            continue;
        };
        let receiver = method.receiver_name.clone();
        let mut visitor = CallVisitor {
            source,
            receiver: &receiver,
            current: &method_name,
            names: &names,
            calls: Vec::new(),
        };
        visitor.visit_block(&f.block);
        method.calls = visitor.calls;
    }

    let message_path = resolve_message_path(&imports, &methods)?;

    Ok(ParsedService {
        source: source.to_string(),
        service_name,
        imports,
        methods,
        message_path,
    })
}

fn extract_method(source: &str, f: &syn::ImplItemFn) -> Option<ServiceMethod> {
    let mut inputs = f.sig.inputs.iter();
    let syn::FnArg::Receiver(_) = inputs.next()? else {
        return None;
    };
    if f.sig.inputs.len() != 3 {
        return None;
    }

    let syn::FnArg::Typed(ctx) = inputs.next()? else {
        return None;
    };
    let syn::FnArg::Typed(req) = inputs.next()? else {
        return None;
    };
    let ctx_name = pat_ident(&ctx.pat)?;
    let req_name = pat_ident(&req.pat)?;

    let syn::ReturnType::Type(_, ret_ty) = &f.sig.output else {
        return None;
    };
    let resp_type = result_ok_type(source, ret_ty)?;

    let open = f.block.brace_token.span.open().byte_range();
    let close = f.block.brace_token.span.close().byte_range();

    Some(ServiceMethod {
        name: f.sig.ident.to_string(),
        receiver_name: "self".to_string(),
        ctx_name,
        ctx_type: span_text(source, ctx.ty.span()).to_string(),
        req_name,
        req_type: span_text(source, req.ty.span()).to_string(),
        resp_type,
        ret_type: span_text(source, ret_ty.span()).to_string(),
        body_start: open.end,
        body_end: close.start,
        calls: Vec::new(),
    })
}

fn pat_ident(pat: &syn::Pat) -> Option<String> {
    match pat {
        syn::Pat::Ident(ident) => Some(ident.ident.to_string()),
        _ => None,
    }
}

fn impl_type_name(item: &syn::ItemImpl) -> Option<String> {
    match &*item.self_ty {
        syn::Type::Path(tp) => tp.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

/// The success type of a `Result<T, E>` return, as verbatim source text.
fn result_ok_type(source: &str, ty: &syn::Type) -> Option<String> {
    let syn::Type::Path(tp) = ty else { return None };
    let last = tp.path.segments.last()?;
    if last.ident != "Result" {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &last.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        syn::GenericArgument::Type(t) => Some(span_text(source, t.span()).to_string()),
        _ => None,
    })
}

fn flatten_use_tree(
    tree: &syn::UseTree,
    prefix: &mut Vec<String>,
    text: &str,
    out: &mut Vec<UseItem>,
) {
    match tree {
        syn::UseTree::Path(p) => {
            prefix.push(p.ident.to_string());
            flatten_use_tree(&p.tree, prefix, text, out);
            prefix.pop();
        }
        syn::UseTree::Name(n) => {
            let mut segments = prefix.clone();
            segments.push(n.ident.to_string());
            out.push(UseItem {
                text: text.to_string(),
                name: n.ident.to_string(),
                path: segments.join("::"),
                renamed: false,
            });
        }
        syn::UseTree::Rename(r) => {
            let mut segments = prefix.clone();
            segments.push(r.ident.to_string());
            out.push(UseItem {
                text: text.to_string(),
                name: r.rename.to_string(),
                path: segments.join("::"),
                renamed: true,
            });
        }
        syn::UseTree::Group(g) => {
            for item in &g.items {
                flatten_use_tree(item, prefix, text, out);
            }
        }
        // Globs bind no single name; nothing to resolve against.
        syn::UseTree::Glob(_) => {}
    }
}

/// Resolves the message module: the request type's leading qualifier is
/// matched against the imports, explicit renames first, then final path
/// segments.
fn resolve_message_path(imports: &[UseItem], methods: &[ServiceMethod]) -> Result<String> {
    for method in methods {
        let ty = method.req_type.trim_start_matches('&').trim();
        let Some((qualifier, _)) = ty.split_once("::") else {
            continue;
        };
        let qualifier = qualifier.trim();

        if let Some(import) = imports.iter().find(|i| i.renamed && i.name == qualifier) {
            return Ok(import.path.clone());
        }
        if let Some(import) = imports.iter().find(|i| !i.renamed && i.name == qualifier) {
            return Ok(import.path.clone());
        }
    }

    Err(CodegenError::UnresolvedMessagePath(
        methods
            .first()
            .map(|m| m.req_type.clone())
            .unwrap_or_default(),
    ))
}

fn span_text<'s>(source: &'s str, span: Span) -> &'s str {
    &source[span.byte_range()]
}

struct CallVisitor<'a> {
    source: &'a str,
    receiver: &'a str,
    current: &'a str,
    names: &'a HashSet<String>,
    calls: Vec<CallSite>,
}

impl<'a, 'ast> Visit<'ast> for CallVisitor<'a> {
    fn visit_expr_method_call(&mut self, call: &'ast syn::ExprMethodCall) {
        if let syn::Expr::Path(receiver) = &*call.receiver {
            let name = call.method.to_string();
            if receiver.path.is_ident(self.receiver)
                && self.names.contains(&name)
                && name != self.current
                && call.args.len() >= 2
            {
                let range = call.span().byte_range();
                let mut args = call.args.iter();
                let ctx_arg = span_text(self.source, args.next().unwrap().span()).to_string();
                let req_arg = span_text(self.source, args.next().unwrap().span()).to_string();
                self.calls.push(CallSite {
                    method: name,
                    ctx_arg,
                    req_arg,
                    start: range.start,
                    end: range.end,
                });
            }
        }
        syn::visit::visit_expr_method_call(self, call);
    }
}
