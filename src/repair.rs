use std::sync::OnceLock;

use regex::Regex;

// Known classes of model mistakes, repaired as plain text rewrites.
// These are best-effort substitutions, not a parse; structurally broken
// input stays broken and surfaces at the bundling stage.

const MATH_FUNCTIONS: &str = "random|sin|cos|tan|floor|ceil|round|abs|max|min|sqrt|pow";

fn math_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(^|[^\w$.])({MATH_FUNCTIONS})\("))
            .expect("math call regex should compile")
    })
}

fn easing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"easing:\s*Easing\.(back|elastic)\(([^)]*)\)")
            .expect("easing regex should compile")
    })
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[A-Za-z]*\n?").expect("fence regex should compile"))
}

fn plain_export_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"export (function|const)").expect("export regex should compile"))
}

fn declaration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^(function\s+[A-Za-z_$][\w$]*|const\s+[A-Za-z_$][\w$]*\s*=)")
            .expect("declaration regex should compile")
    })
}

/// Removes markdown code-fence markers from a model reply, keeping the
/// body verbatim.
pub fn strip_code_fences(raw: &str) -> String {
    fence_re().replace_all(raw, "").trim().to_owned()
}

/// Applies the full repair table. Idempotent: repairing already
/// repaired text is a no-op.
pub fn apply_repairs(source: &str) -> String {
    let mut code = qualify_math_calls(source);
    code = complete_easing_wrappers(&code);
    ensure_default_export(&code)
}

/// Rewrites unqualified math-function calls (`sin(`, `random(`, ...) to
/// their `Math.`-namespaced form. Already qualified calls are left
/// untouched. Runs to a fixpoint so adjacent calls (`sin(cos(x))`) are
/// all rewritten.
fn qualify_math_calls(source: &str) -> String {
    let mut current = source.to_owned();
    loop {
        let rewritten = math_call_re()
            .replace_all(&current, "${1}Math.${2}(")
            .into_owned();
        if rewritten == current {
            return current;
        }
        current = rewritten;
    }
}

/// Completes `easing: Easing.back(...)` / `Easing.elastic(...)` into
/// the fully wrapped `easing: Easing.out(Easing.back(...))` form, with
/// balanced parentheses.
fn complete_easing_wrappers(source: &str) -> String {
    easing_re()
        .replace_all(source, "easing: Easing.out(Easing.${1}(${2}))")
        .into_owned()
}

/// Inserts a default-export marker when the model forgot one: upgrades
/// a plain `export` on a declaration, or prefixes the first
/// recognizable declaration. Source with no declaration at all is
/// returned unchanged; the materializer falls back to a default entry
/// name downstream.
fn ensure_default_export(source: &str) -> String {
    if source.contains("export default") {
        return source.to_owned();
    }
    if plain_export_re().is_match(source) {
        return plain_export_re()
            .replacen(source, 1, "export default ${1}")
            .into_owned();
    }
    match declaration_re().find(source) {
        Some(first) => {
            let mut patched = String::with_capacity(source.len() + 16);
            patched.push_str(&source[..first.start()]);
            patched.push_str("export default ");
            patched.push_str(&source[first.start()..]);
            patched
        }
        None => source.to_owned(),
    }
}
