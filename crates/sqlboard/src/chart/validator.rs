//! Static checks on user chart functions.
//!
//! The host calls the function synchronously with no way to interrupt it, so
//! the three unbounded loop shapes are refused outright. This walks the
//! tree-sitter syntax tree; it does not try to prove termination and does not
//! catch unbounded recursion.

use tree_sitter::{Node, Parser};

use crate::core::validate::ValidationResult;
use crate::error::{AppError, AppResult};

/// Parameter names the host passes, in order.
pub const CHART_PARAMETERS: [&str; 5] = ["data", "svg", "d3", "width", "height"];

pub const WHILE_LOOP: &str = "while loops are not allowed";
pub const INFINITE_FOR_LOOP: &str = "infinite for loops are not allowed";
pub const DO_WHILE_LOOP: &str = "do-while loops are not allowed";
pub const NOT_A_FUNCTION: &str = "Chart function must be a single function definition";

/// Source is evaluated by the host as one expression, so it is parsed the
/// same way: wrapped in parentheses.
pub fn validate_chart_function(source: &str) -> AppResult<ValidationResult> {
    let body = source.trim_end().trim_end_matches(';');
    if body.trim().is_empty() {
        return Err(AppError::InvalidRequest("Chart function source is required".into()));
    }
    let wrapped = format!("({body}\n)");

    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_javascript::LANGUAGE.into())
        .map_err(|e| AppError::Internal(format!("failed to load JavaScript grammar: {e}")))?;
    let tree = parser
        .parse(&wrapped, None)
        .ok_or_else(|| AppError::Internal("JavaScript parser produced no tree".into()))?;
    let root = tree.root_node();
    let src = wrapped.as_bytes();

    if root.has_error() {
        return Ok(ValidationResult::rejected(syntax_error(root)));
    }

    let Some(function) = single_function(root) else {
        return Ok(ValidationResult::rejected(NOT_A_FUNCTION));
    };

    if parameter_count(function) > CHART_PARAMETERS.len() {
        return Ok(ValidationResult::rejected(format!(
            "Chart function must accept at most {} parameters ({})",
            CHART_PARAMETERS.len(),
            CHART_PARAMETERS.join(", ")
        )));
    }

    if let Some(reason) = find_unbounded_loop(function, src) {
        tracing::debug!(reason, "chart function rejected");
        return Ok(ValidationResult::rejected(reason));
    }

    Ok(ValidationResult::accepted())
}

pub fn ensure_valid_chart(source: &str) -> AppResult<()> {
    validate_chart_function(source)?.into_result()
}

fn syntax_error(root: Node<'_>) -> String {
    match first_error(root) {
        Some(node) => {
            let pos = node.start_position();
            // Undo the column shift from the opening parenthesis.
            let column = if pos.row == 0 { pos.column } else { pos.column + 1 };
            format!("Syntax error at line {}, column {}", pos.row + 1, column.max(1))
        }
        None => "Syntax error".to_string(),
    }
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children.into_iter().filter(|c| c.has_error()).find_map(first_error)
}

/// `program > expression_statement > parenthesized_expression > function`.
fn single_function(root: Node<'_>) -> Option<Node<'_>> {
    let statements = named_children(root);
    let &[stmt] = statements.as_slice() else {
        return None;
    };
    if stmt.kind() != "expression_statement" {
        return None;
    }
    let mut expr = named_children(stmt).into_iter().next()?;
    while expr.kind() == "parenthesized_expression" {
        let inner = named_children(expr);
        let &[only] = inner.as_slice() else {
            return None;
        };
        expr = only;
    }
    matches!(expr.kind(), "function_expression" | "function" | "arrow_function").then_some(expr)
}

fn parameter_count(function: Node<'_>) -> usize {
    if let Some(params) = function.child_by_field_name("parameters") {
        named_children(params).len()
    } else if function.child_by_field_name("parameter").is_some() {
        1
    } else {
        0
    }
}

fn find_unbounded_loop(node: Node<'_>, src: &[u8]) -> Option<&'static str> {
    match node.kind() {
        "while_statement" => return Some(WHILE_LOOP),
        "do_statement" => return Some(DO_WHILE_LOOP),
        "for_statement" if for_condition_always_true(node, src) => return Some(INFINITE_FOR_LOOP),
        _ => {}
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children.into_iter().find_map(|child| find_unbounded_loop(child, src))
}

fn for_condition_always_true(for_stmt: Node<'_>, src: &[u8]) -> bool {
    let mut cursor = for_stmt.walk();
    let condition = for_stmt
        .children_by_field_name("condition", &mut cursor)
        .find(|n| n.is_named());
    match condition {
        None => true,
        Some(n) if n.kind() == "empty_statement" => true,
        Some(n) if n.kind() == "expression_statement" => match named_children(n).first() {
            Some(&expr) => is_truthy_literal(expr, src),
            None => true,
        },
        Some(expr) => is_truthy_literal(expr, src),
    }
}

/// True only for conditions whose value is fixed by the source text.
fn is_truthy_literal(expr: Node<'_>, src: &[u8]) -> bool {
    match expr.kind() {
        "true" | "array" | "object" | "arrow_function" | "function_expression" | "function" | "regex" => true,
        "number" => node_text(expr, src).is_some_and(|t| number_literal(t).is_some_and(|v| v != 0.0 && !v.is_nan())),
        "string" | "template_string" => {
            !has_substitution(expr) && node_text(expr, src).is_some_and(|t| t.chars().count() > 2)
        }
        "parenthesized_expression" | "sequence_expression" => {
            named_children(expr).last().is_some_and(|&inner| is_truthy_literal(inner, src))
        }
        "unary_expression" => {
            let negated = expr
                .child_by_field_name("operator")
                .and_then(|op| node_text(op, src))
                == Some("!");
            negated
                && expr
                    .child_by_field_name("argument")
                    .is_some_and(|arg| is_falsy_literal(arg, src))
        }
        _ => false,
    }
}

fn is_falsy_literal(expr: Node<'_>, src: &[u8]) -> bool {
    match expr.kind() {
        "false" | "null" | "undefined" => true,
        "identifier" => node_text(expr, src) == Some("undefined"),
        "number" => node_text(expr, src).and_then(number_literal).is_some_and(|v| v == 0.0),
        "string" | "template_string" => {
            !has_substitution(expr) && node_text(expr, src).is_some_and(|t| t.chars().count() <= 2)
        }
        "parenthesized_expression" | "sequence_expression" => {
            named_children(expr).last().is_some_and(|&inner| is_falsy_literal(inner, src))
        }
        "unary_expression" => {
            let negated = expr
                .child_by_field_name("operator")
                .and_then(|op| node_text(op, src))
                == Some("!");
            negated
                && expr
                    .child_by_field_name("argument")
                    .is_some_and(|arg| is_truthy_literal(arg, src))
        }
        _ => false,
    }
}

fn has_substitution(expr: Node<'_>) -> bool {
    named_children(expr).iter().any(|c| c.kind() == "template_substitution")
}

fn number_literal(text: &str) -> Option<f64> {
    let t = text.replace('_', "");
    let t = t.trim_end_matches('n');
    let radix = |prefix: [&str; 2], radix: u32| {
        prefix
            .iter()
            .find_map(|p| t.strip_prefix(p))
            .map(|digits| u64::from_str_radix(digits, radix).map(|v| v as f64).ok())
    };
    radix(["0x", "0X"], 16)
        .or_else(|| radix(["0o", "0O"], 8))
        .or_else(|| radix(["0b", "0B"], 2))
        .unwrap_or_else(|| t.parse::<f64>().ok())
}

fn node_text<'a>(node: Node<'_>, src: &'a [u8]) -> Option<&'a str> {
    node.utf8_text(src).ok()
}

/// Named children, comments excluded.
fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect()
}
