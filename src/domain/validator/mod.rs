//! Static analysis of endpoint callbacks before they are allowed anywhere near execution.
//!
//! Inline code is parsed with the Rhai compiler (optimisation off, so the tree mirrors the
//! submitted text) and every node is visited. A call to a denylisted identifier or a string
//! literal carrying `<script>`/`<iframe>` markup fails the verdict. Parsing or walking
//! failures are treated as unsafe.

use regex::Regex;
use rhai::{ASTNode, Engine, Expr, OptimizationLevel, Stmt};
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

pub mod denylist;
pub mod verdict;

pub use denylist::{is_forbidden_name, FORBIDDEN_FUNCTIONS};
pub use verdict::{ValidationErrorKind, ValidationVerdict};

/// (tag, pattern) pairs for markup that may never appear in a literal.
fn markup_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            ("script", r"(?is)<script\b[^>]*>.*?</script\s*>"),
            ("iframe", r"(?is)<iframe\b[^>]*>.*?</iframe\s*>"),
        ]
        .into_iter()
        .map(|(tag, pattern)| (tag, Regex::new(pattern).expect("static markup pattern")))
        .collect()
    })
}

/// Returns the offending tag when `text` contains forbidden markup.
pub fn forbidden_markup(text: &str) -> Option<&'static str> {
    markup_patterns()
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(tag, _)| *tag)
}

pub struct CodeValidator {
    engine: Engine,
}

impl CodeValidator {
    pub fn new() -> Self {
        let mut engine = Engine::new_raw();
        engine.set_optimization_level(OptimizationLevel::None);
        Self { engine }
    }

    /// Validates inline source. Never panics: any internal failure yields an unsafe verdict.
    pub fn validate(&self, source: &str) -> ValidationVerdict {
        match panic::catch_unwind(AssertUnwindSafe(|| self.inspect(source))) {
            Ok(verdict) => verdict,
            Err(_) => ValidationVerdict::syntax_error("validator failed while inspecting the code"),
        }
    }

    /// Validates a bare function reference: denylist first, then existence.
    pub fn validate_reference(&self, name: &str, exists: impl Fn(&str) -> bool) -> ValidationVerdict {
        let name = name.trim();
        if is_forbidden_name(name) {
            return ValidationVerdict::forbidden_function(name);
        }
        if !exists(name) {
            return ValidationVerdict::undefined_function(name);
        }
        ValidationVerdict::passed()
    }

    fn inspect(&self, source: &str) -> ValidationVerdict {
        let ast = match self.engine.compile(source) {
            Ok(ast) => ast,
            Err(e) => return ValidationVerdict::syntax_error(e),
        };

        let mut forbidden_call: Option<String> = None;
        let mut forbidden_tag: Option<&'static str> = None;

        ast.walk(&mut |path| {
            let Some(node) = path.last() else {
                return true;
            };
            match node {
                ASTNode::Stmt(Stmt::FnCall(call, _))
                | ASTNode::Expr(Expr::FnCall(call, _))
                | ASTNode::Expr(Expr::MethodCall(call, _)) => {
                    if is_forbidden_name(call.name.as_str()) {
                        forbidden_call = Some(call.name.to_string());
                        // A forbidden call outranks any content finding; stop here.
                        return false;
                    }
                }
                ASTNode::Expr(Expr::StringConstant(text, _)) => {
                    if forbidden_tag.is_none() {
                        forbidden_tag = forbidden_markup(text.as_str());
                    }
                }
                ASTNode::Expr(Expr::DynamicConstant(value, _)) => {
                    if forbidden_tag.is_none() {
                        forbidden_tag = forbidden_markup(&value.to_string());
                    }
                }
                _ => {}
            }
            true
        });

        if let Some(name) = forbidden_call {
            return ValidationVerdict::forbidden_function(&name);
        }
        if let Some(tag) = forbidden_tag {
            return ValidationVerdict::forbidden_content(tag);
        }
        ValidationVerdict::passed()
    }
}

impl Default for CodeValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kind(source: &str) -> Option<ValidationErrorKind> {
        CodeValidator::new().validate(source).error_kind
    }

    #[test]
    fn clean_code_passes() {
        let verdict = CodeValidator::new().validate(
            r#"
            let total = 0;
            for item in request.body.items { total += item.price; }
            #{ total: total, label: `orders for ${request.user}` }
            "#,
        );
        assert!(verdict.ok, "{}", verdict.message);
        assert_eq!(verdict.error_kind, None);
    }

    #[test]
    fn statement_call_to_denylisted_name_is_flagged() {
        let verdict = CodeValidator::new().validate(r#"exec("rm -rf /");"#);
        assert!(!verdict.ok);
        assert_eq!(verdict.error_kind, Some(ValidationErrorKind::ForbiddenFunction));
        assert!(verdict.message.contains("Forbidden function"));
        assert!(verdict.message.contains("exec"));
    }

    #[test]
    fn nested_and_method_calls_are_flagged() {
        assert_eq!(
            kind(r#"let x = 1 + getenv("HOME").len(); x"#),
            Some(ValidationErrorKind::ForbiddenFunction)
        );
        assert_eq!(
            kind(r#"let f = "/tmp/x"; f.unlink()"#),
            Some(ValidationErrorKind::ForbiddenFunction)
        );
        assert_eq!(
            kind("fn helper() { system(\"id\") } helper()"),
            Some(ValidationErrorKind::ForbiddenFunction)
        );
        assert_eq!(kind(r#"eval("40 + 2")"#), Some(ValidationErrorKind::ForbiddenFunction));
    }

    #[test]
    fn script_markup_in_literal_is_forbidden_content() {
        let verdict = CodeValidator::new().validate(r#"print("<script>alert(1)</script>");"#);
        assert!(!verdict.ok);
        assert_eq!(verdict.error_kind, Some(ValidationErrorKind::ForbiddenContent));
    }

    #[test]
    fn markup_matching_is_case_insensitive_and_spans_lines() {
        assert_eq!(
            kind("let page = \"<IFRAME src='x'>\\n</iframe>\"; page"),
            Some(ValidationErrorKind::ForbiddenContent)
        );
        assert_eq!(
            kind("`<ScRiPt>\nsteal()\n</sCrIpT>`"),
            Some(ValidationErrorKind::ForbiddenContent)
        );
        assert_eq!(kind(r#""<b>bold</b>""#), None);
    }

    #[test]
    fn forbidden_function_outranks_forbidden_content() {
        assert_eq!(
            kind(r#"let s = "<script>x</script>"; exec(s)"#),
            Some(ValidationErrorKind::ForbiddenFunction)
        );
    }

    #[test]
    fn unparsable_code_is_a_syntax_error() {
        let verdict = CodeValidator::new().validate("let = ;;; {");
        assert!(!verdict.ok);
        assert_eq!(verdict.error_kind, Some(ValidationErrorKind::SyntaxError));
        assert!(verdict.message.starts_with("Syntax error:"));
    }

    #[test]
    fn references_check_denylist_before_existence() {
        let validator = CodeValidator::new();
        let exists = |name: &str| name == "list_orders";

        assert!(validator.validate_reference("list_orders", exists).ok);
        assert_eq!(
            validator.validate_reference("exec", exists).error_kind,
            Some(ValidationErrorKind::ForbiddenFunction)
        );
        assert_eq!(
            validator.validate_reference("missing_fn", exists).error_kind,
            Some(ValidationErrorKind::UndefinedFunction)
        );
    }

    proptest! {
        #[test]
        fn any_denylisted_call_is_rejected(
            idx in 0..FORBIDDEN_FUNCTIONS.len(),
            arg in "[a-z0-9 ]{0,12}",
        ) {
            let name = FORBIDDEN_FUNCTIONS[idx];
            let source = format!("let out = {}(\"{}\"); out", name, arg);
            let verdict = CodeValidator::new().validate(&source);
            prop_assert!(!verdict.ok);
            prop_assert_eq!(verdict.error_kind, Some(ValidationErrorKind::ForbiddenFunction));
        }

        #[test]
        fn arbitrary_input_never_panics(source in ".{0,64}") {
            let verdict = CodeValidator::new().validate(&source);
            prop_assert!(verdict.ok || verdict.error_kind.is_some());
        }

        #[test]
        fn plain_arithmetic_is_accepted(a in 0i64..1000, b in 0i64..1000) {
            let source = format!("let a = {}; let b = {}; #{{ sum: a + b }}", a, b);
            prop_assert!(CodeValidator::new().validate(&source).ok);
        }
    }
}
