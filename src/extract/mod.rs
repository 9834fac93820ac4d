//! ObjectExtractor (spec §4.3): grammar-driven parse of `(path, bytes,
//! language)` into the finite ordered list of `Object`s.

mod grammar;
mod object;

pub use object::{Coordinates, Object, ObjectKind};

use tree_sitter::{Node, Parser, TreeCursor};

use crate::constants::CONTEXT_WINDOW_BYTES;
use crate::source::Language;
use grammar::{grammar_for, Grammar, KindMapping};

/// Parse `source` (the bytes of `path`) into its objects. Parse failures
/// are non-fatal: `Err` is returned so the caller can log a warning and
/// still update the fingerprint, contributing zero objects for the file
/// (spec §4.3, §7).
pub fn extract(path: &str, source: &[u8], language: Language) -> Result<Vec<Object>, String> {
    let Some(grammar) = grammar_for(language) else {
        // Unknown/unsupported language: the file is still catalogued, just
        // with zero objects (spec §4.1, §4.3).
        return Ok(Vec::new());
    };

    let mut parser = Parser::new();
    parser
        .set_language(&(grammar.language)())
        .map_err(|e| format!("failed to load grammar for {language}: {e}"))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| format!("tree-sitter failed to parse {path}"))?;

    let mut objects = Vec::new();
    let mut next_id: i64 = 0;
    let mut cursor = tree.root_node().walk();
    walk(
        &mut cursor,
        source,
        path,
        language,
        &grammar,
        0,
        &mut objects,
        &mut next_id,
    );

    Ok(objects)
}

/// Depth-first walk. `decl_depth` counts how many *extracted-kind*
/// ancestors enclose the current node (container/wrapper nodes like
/// `declaration_list` or `block` don't increment it). Objects are only
/// emitted while `decl_depth <= 1`, realizing the "top-level and
/// one-level-nested" rule of spec §4.3.
#[allow(clippy::too_many_arguments)]
fn walk(
    cursor: &mut TreeCursor,
    source: &[u8],
    path: &str,
    language: Language,
    grammar: &Grammar,
    decl_depth: u32,
    objects: &mut Vec<Object>,
    next_id: &mut i64,
) {
    if !cursor.goto_first_child() {
        return;
    }
    loop {
        let node = cursor.node();
        if let Some(mapping) = find_mapping(grammar, node.kind()) {
            if decl_depth <= 1 {
                if let Some(object) = build_object(
                    &node,
                    source,
                    path,
                    language,
                    grammar,
                    mapping,
                    decl_depth,
                    next_id,
                ) {
                    objects.push(object);
                }
            }
            let mut child_cursor = node.walk();
            walk(
                &mut child_cursor,
                source,
                path,
                language,
                grammar,
                decl_depth + 1,
                objects,
                next_id,
            );
        } else if grammar.container_kinds.contains(&node.kind()) {
            // Transparent container (declaration_list, block, ...): keep
            // searching its children at the same nesting depth.
            let mut child_cursor = node.walk();
            walk(
                &mut child_cursor,
                source,
                path,
                language,
                grammar,
                decl_depth,
                objects,
                next_id,
            );
        }
        // Anything else (expressions, statements, attributes, ...) is not a
        // declaration container: stop descending rather than hunting for
        // declarations buried arbitrarily deep in unrelated syntax.
        if !cursor.goto_next_sibling() {
            break;
        }
    }
    cursor.goto_parent();
}

fn find_mapping<'g>(grammar: &'g Grammar, node_kind: &str) -> Option<&'g KindMapping> {
    grammar.mappings.iter().find(|m| m.node_kind == node_kind)
}

#[allow(clippy::too_many_arguments)]
fn build_object(
    node: &Node,
    source: &[u8],
    path: &str,
    language: Language,
    grammar: &Grammar,
    mapping: &KindMapping,
    decl_depth: u32,
    next_id: &mut i64,
) -> Option<Object> {
    let name = extract_name(node, mapping, source)?;

    let kind = if decl_depth >= 1 {
        mapping.nested.unwrap_or(mapping.top_level)
    } else {
        mapping.top_level
    };

    let (start_byte, end_byte) = extend_for_doc_comment(node, source, grammar);

    let body = std::str::from_utf8(&source[node.start_byte()..node.end_byte()])
        .ok()?
        .to_string();
    let context_before = leading_context(source, start_byte);
    let context_after = trailing_context(source, end_byte);
    let start_point = byte_to_point(source, start_byte);
    let end_point = byte_to_point(source, end_byte);

    let id = *next_id;
    *next_id += 1;

    Some(Object {
        id,
        path: path.to_string(),
        name,
        language,
        kind,
        byte_range: start_byte..end_byte,
        coordinates: Coordinates {
            start_line: start_point.0,
            start_col: start_point.1,
            end_line: end_point.0,
            end_col: end_point.1,
        },
        context_before,
        context_after,
        body,
    })
}

/// Resolve the declaration's identifier text per `mapping.name_fields`,
/// tried in order; if none yields an identifier-shaped leaf, the grammar
/// produced an anonymous declaration and the object is skipped (spec §4.3).
fn extract_name(node: &Node, mapping: &KindMapping, source: &[u8]) -> Option<String> {
    for field in mapping.name_fields {
        if let Some(child) = node.child_by_field_name(field) {
            if let Some(text) = identifier_text(&child, source) {
                return Some(text);
            }
        }
    }
    None
}

/// A field value is sometimes the identifier itself, sometimes a composite
/// declarator (C/C++ `function_declarator`) wrapping one. Search down for
/// the first `*identifier*`-kinded descendant.
fn identifier_text(node: &Node, source: &[u8]) -> Option<String> {
    if node.kind().ends_with("identifier") {
        return node.utf8_text(source).ok().map(|s| s.to_string());
    }
    let mut cursor = node.walk();
    if cursor.goto_first_child() {
        loop {
            if let Some(found) = identifier_text(&cursor.node(), source) {
                return Some(found);
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }
    None
}

/// Extend the declaration's byte range backward over immediately adjacent
/// leading doc-comments (no blank line between comment and declaration,
/// or between chained comment lines) — spec §4.3.
fn extend_for_doc_comment(node: &Node, source: &[u8], grammar: &Grammar) -> (usize, usize) {
    let mut start = node.start_byte();
    let mut current = *node;
    loop {
        let Some(prev) = current.prev_sibling() else {
            break;
        };
        if !grammar.comment_kinds.contains(&prev.kind()) {
            break;
        }
        if has_blank_line(source, prev.end_byte(), start) {
            break;
        }
        start = prev.start_byte();
        current = prev;
    }
    (start, node.end_byte())
}

/// Whether the gap `source[from..to]` contains a blank line (two or more
/// newlines), which breaks doc-comment adjacency.
fn has_blank_line(source: &[u8], from: usize, to: usize) -> bool {
    let gap = &source[from.min(source.len())..to.min(source.len())];
    let newline_count = gap.iter().filter(|&&b| b == b'\n').count();
    newline_count >= 2
}

/// Up to `CONTEXT_WINDOW_BYTES` preceding `start`, truncated to a line
/// boundary (drop a leading partial line), per spec §4.3.
fn leading_context(source: &[u8], start: usize) -> String {
    let window_start = start.saturating_sub(CONTEXT_WINDOW_BYTES);
    let mut slice_start = window_start;
    if window_start > 0 {
        if let Some(pos) = source[window_start..start].iter().position(|&b| b == b'\n') {
            slice_start = window_start + pos + 1;
        }
    }
    String::from_utf8_lossy(&source[slice_start..start]).to_string()
}

/// Up to `CONTEXT_WINDOW_BYTES` following `end`, truncated to a line
/// boundary (drop a trailing partial line), per spec §4.3.
fn trailing_context(source: &[u8], end: usize) -> String {
    let window_end = (end + CONTEXT_WINDOW_BYTES).min(source.len());
    let mut slice_end = window_end;
    if window_end < source.len() {
        if let Some(pos) = source[end..window_end].iter().rposition(|&b| b == b'\n') {
            slice_end = end + pos + 1;
        }
    }
    String::from_utf8_lossy(&source[end..slice_end]).to_string()
}

/// UTF-8-byte-offset to 0-based (line, column) conversion (spec §4.3).
fn byte_to_point(source: &[u8], offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let mut line = 0usize;
    let mut line_start = 0usize;
    for (i, &b) in source[..offset].iter().enumerate() {
        if b == b'\n' {
            line += 1;
            line_start = i + 1;
        }
    }
    (line, offset - line_start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_function_and_class_with_method() {
        let source = br#"def foo():
    pass


class Bar:
    def baz(self):
        return 1
"#;
        let objects = extract("a.py", source, Language::Python).unwrap();
        let names: Vec<&str> = objects.iter().map(|o| o.name.as_str()).collect();
        assert!(names.contains(&"foo"));
        assert!(names.contains(&"Bar"));
        assert!(names.contains(&"baz"));

        let baz = objects.iter().find(|o| o.name == "baz").unwrap();
        assert_eq!(baz.kind.tag(), "method");
        let foo = objects.iter().find(|o| o.name == "foo").unwrap();
        assert_eq!(foo.kind.tag(), "function");
    }

    #[test]
    fn skips_anonymous_js_arrow_assigned_without_name_field() {
        // lexical_declaration captures the whole `const x = ...` statement,
        // which always has child structure but no `name` field on itself —
        // exercised indirectly via the variable mapping having no name_fields,
        // which means extract_name always returns None and the object is
        // skipped, matching "no identifier -> skip" (spec §4.3).
        let source = b"const x = () => 1;\n";
        let objects = extract("a.js", source, Language::JavaScript).unwrap();
        assert!(objects.is_empty());
    }

    #[test]
    fn deeply_nested_declaration_caps_at_one_level() {
        let source = br#"
class Outer:
    class Inner:
        def method(self):
            pass
"#;
        let objects = extract("a.py", source, Language::Python).unwrap();
        let names: Vec<&str> = objects.iter().map(|o| o.name.as_str()).collect();
        assert!(names.contains(&"Outer"));
        assert!(names.contains(&"Inner"));
        // `method` is nested two levels deep (Outer -> Inner -> method) and
        // must not be extracted.
        assert!(!names.contains(&"method"));
    }

    #[test]
    fn adjacent_doc_comment_included_in_range() {
        let source = b"// a doc comment\nfn foo() {}\n";
        let objects = extract("a.rs", source, Language::Rust).unwrap();
        let foo = objects.iter().find(|o| o.name == "foo").unwrap();
        assert!(foo.body.starts_with("fn foo"));
        assert!(source[foo.byte_range.clone()].starts_with(b"// a doc comment"));
    }

    #[test]
    fn doc_comment_separated_by_blank_line_excluded() {
        let source = b"// unrelated comment\n\nfn foo() {}\n";
        let objects = extract("a.rs", source, Language::Rust).unwrap();
        let foo = objects.iter().find(|o| o.name == "foo").unwrap();
        assert!(!source[foo.byte_range.clone()].starts_with(b"//"));
    }

    #[test]
    fn empty_file_yields_no_objects() {
        let objects = extract("empty.rs", b"", Language::Rust).unwrap();
        assert!(objects.is_empty());
    }

    #[test]
    fn unknown_language_yields_no_objects_but_does_not_error() {
        let objects = extract("a.bin", b"whatever", Language::Unknown).unwrap();
        assert!(objects.is_empty());
    }

    #[test]
    fn whole_file_single_object_rust() {
        let source = b"fn only() { 1 }\n";
        let objects = extract("a.rs", source, Language::Rust).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].byte_range, 0..source.len() - 1);
    }
}
