//! `api.fetch(url, callback [, { cache = true }])`.
//!
//! Returns at once. The body, or an error string, is delivered later as
//! `callback(ok, body_or_error)` in a fresh invocation. With `cache = true`
//! a stored body is redelivered without touching the network, and a fresh
//! body is stored before the callback runs.

use super::{Feature, FeatureContext, define, json_arg, string_arg};
use crate::permissions::Permission;
use mlua::{Lua, Table, Value};
use url::Url;

pub const FETCH: Feature = Feature {
    name: "fetch",
    namespace: None,
    permission: Permission::Network,
    install: install_fetch,
};

/// Cache key under which fetched bodies are memoized.
pub fn cache_key(url: &str) -> String {
    format!("fetch:{url}")
}

fn install_fetch(lua: &Lua, ns: &Table, ctx: &FeatureContext) -> mlua::Result<()> {
    define(lua, ns, "fetch", ctx, |_lua, ctx, args| {
        let Some(raw_url) = string_arg(args, 0) else {
            return ctx.misuse("fetch", "url must be a string");
        };
        let Some(Value::Function(callback)) = args.get(1) else {
            return ctx.misuse("fetch", "callback must be a function");
        };
        let use_cache = match json_arg(args, 2) {
            Ok(opts) => opts.get("cache").and_then(|v| v.as_bool()).unwrap_or(false),
            Err(e) => return ctx.misuse("fetch", format!("options: {e}")),
        };

        let url = match Url::parse(&raw_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            Ok(url) => return ctx.misuse("fetch", format!("scheme '{}' is not allowed", url.scheme())),
            Err(e) => return ctx.misuse("fetch", format!("invalid url '{raw_url}': {e}")),
        };
        let origin = url.origin().ascii_serialization();
        if !ctx.manifest.allows_origin(&origin) {
            return ctx.misuse("fetch", format!("origin '{origin}' is not in the manifest's allowed origins"));
        }

        let ticket = ctx.scheduler.next_ticket();
        ctx.pending.borrow_mut().insert(ticket, callback.clone());

        let key = use_cache.then(|| cache_key(url.as_str()));
        if let Some(body) = key.as_deref().and_then(|k| ctx.cache.get(k)) {
            tracing::debug!(plugin_id = %ctx.plugin_id, ticket, "Fetch served from plugin cache");
            ctx.scheduler
                .complete_now(ctx.completion_target(), ticket, Ok(body), None);
        } else {
            let work = ctx.services.fetcher.fetch(url.as_str());
            ctx.scheduler.spawn(ctx.completion_target(), ticket, work, key);
        }
        Ok(Value::Integer(ticket as i64))
    })
}
