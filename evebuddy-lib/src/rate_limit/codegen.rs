//! Rust source generation for rate limit tables.

use std::fmt::Write;

use super::RateLimitSpec;

/// First line of every generated file.
pub const GENERATED_HEADER: &str = "// Code generated by evebuddy gen-ratelimit. DO NOT EDIT.";

/// Generates Rust source declaring `RATE_LIMIT_GROUPS` and `OPERATION_GROUPS`.
///
/// Output is sorted by name, so the same spec always yields the same file.
/// Unlimited operations map to the empty group name.
///
/// # Example
///
/// ```
/// use evebuddy_lib::rate_limit::{generate, parse_spec};
///
/// let spec = parse_spec(r#"{"paths":{"/status":{"get":{"operationId":"GetStatus"}}}}"#).unwrap();
/// let source = generate(&spec);
/// assert!(source.contains(r#"("GetStatus", ""),"#));
/// ```
pub fn generate(spec: &RateLimitSpec) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_source(&mut out, spec);
    out
}

fn write_source(out: &mut String, spec: &RateLimitSpec) -> std::fmt::Result {
    writeln!(out, "{}", GENERATED_HEADER)?;
    writeln!(out)?;
    writeln!(out, "use std::time::Duration;")?;
    writeln!(out)?;
    writeln!(out, "use evebuddy_lib::rate_limit::RateLimitGroup;")?;
    writeln!(out)?;

    writeln!(out, "pub static RATE_LIMIT_GROUPS: &[RateLimitGroup] = &[")?;
    for group in spec.groups.values() {
        writeln!(
            out,
            "    RateLimitGroup::new({:?}, {}, Duration::from_secs({})),",
            group.name,
            group.max_tokens,
            group.window.as_secs()
        )?;
    }
    writeln!(out, "];")?;
    writeln!(out)?;

    writeln!(out, "pub static OPERATION_GROUPS: &[(&str, &str)] = &[")?;
    for (operation, group) in &spec.operations {
        writeln!(
            out,
            "    ({:?}, {:?}),",
            operation,
            group.as_deref().unwrap_or("")
        )?;
    }
    writeln!(out, "];")?;
    Ok(())
}
