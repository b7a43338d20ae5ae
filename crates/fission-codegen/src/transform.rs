//! Sibling-call rewriting.
//!
//! Replaces each `self.sibling(ctx_expr, req_expr)` call in a method body
//! with a typed remote invocation through the worker runtime. Replacements
//! run in descending position order so earlier byte offsets stay valid, and
//! every byte outside a rewritten call expression is preserved.

use crate::ident;
use crate::parser::{ParsedService, ServiceMethod};

/// The replacement for one sibling call: generic parameters are the
/// sibling's request and response types, the first argument is its method
/// address, and the captured context and request argument text is spliced
/// in verbatim.
fn remote_call(parsed: &ParsedService, target: &ServiceMethod, ctx_arg: &str, req_arg: &str) -> String {
    let address = ident::method_address(&parsed.message_path, &parsed.service_name, &target.name);
    format!(
        "fission_node::call::<{}, {}>(\"{}\", {}, {})",
        target.req_type, target.resp_type, address, ctx_arg, req_arg
    )
}

/// Returns the method body (exclusive of the braces) with every sibling
/// call site rewritten.
pub fn rewrite_method_body(parsed: &ParsedService, method: &ServiceMethod) -> String {
    let mut body = parsed.source[method.body_start..method.body_end].to_string();

    let mut sites = method.calls.clone();
    sites.sort_by(|a, b| b.start.cmp(&a.start));

    for site in &sites {
        let Some(target) = parsed.method(&site.method) else {
            continue;
        };
        let replacement = remote_call(parsed, target, &site.ctx_arg, &site.req_arg);

        let start = site.start - method.body_start;
        let end = site.end - method.body_start;
        if end > body.len() {
            continue;
        }
        body.replace_range(start..end, &replacement);
    }

    body
}
