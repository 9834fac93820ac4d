//! Static registry mapping each supported `Language` to its tree-sitter
//! grammar and the node-kind → `ObjectKind` table that realizes spec §3's
//! taxonomy for that language (spec §9 Open Question (a), §9 "no dynamic
//! plugin loading — a static registry keyed by language tag").

use tree_sitter::Language as TsLanguage;

use super::object::ObjectKind;
use crate::source::Language;

/// A declaration node kind for a language, and what it maps to at
/// top-level. Nesting one level inside another extracted declaration may
/// remap the kind (e.g. a `Function` nested in a `Class` becomes a
/// `Method`) — see `nested_kind`.
#[derive(Debug, Clone, Copy)]
pub struct KindMapping {
    pub node_kind: &'static str,
    pub top_level: ObjectKind,
    /// What this node kind becomes when nested one level inside another
    /// extracted declaration. `None` means it keeps `top_level`'s kind.
    pub nested: Option<ObjectKind>,
    /// Field name (or names, tried in order) tree-sitter exposes the
    /// identifier under.
    pub name_fields: &'static [&'static str],
}

pub struct Grammar {
    pub language: fn() -> TsLanguage,
    pub mappings: &'static [KindMapping],
    /// Node kinds that are doc/line comments eligible for the "adjacent
    /// leading comment" extension rule (spec §4.3).
    pub comment_kinds: &'static [&'static str],
    /// Node kinds that are transparent containers whose *children* should
    /// be visited at the same nesting depth (e.g. a `declaration_list` or
    /// `block` wrapping a class body) rather than module-level wrappers.
    pub container_kinds: &'static [&'static str],
}

pub fn grammar_for(language: Language) -> Option<Grammar> {
    match language {
        Language::Rust => Some(Grammar {
            language: || tree_sitter_rust::LANGUAGE.into(),
            mappings: RUST_MAPPINGS,
            comment_kinds: &["line_comment", "block_comment"],
            container_kinds: &["declaration_list", "field_declaration_list"],
        }),
        Language::Python => Some(Grammar {
            language: || tree_sitter_python::LANGUAGE.into(),
            mappings: PYTHON_MAPPINGS,
            comment_kinds: &["comment"],
            container_kinds: &["block"],
        }),
        Language::JavaScript => Some(Grammar {
            language: || tree_sitter_javascript::LANGUAGE.into(),
            mappings: JS_MAPPINGS,
            comment_kinds: &["comment"],
            container_kinds: &["class_body", "statement_block"],
        }),
        Language::TypeScript => Some(Grammar {
            language: || tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            mappings: TS_MAPPINGS,
            comment_kinds: &["comment"],
            container_kinds: &["class_body", "statement_block", "interface_body"],
        }),
        Language::Go => Some(Grammar {
            language: || tree_sitter_go::LANGUAGE.into(),
            mappings: GO_MAPPINGS,
            comment_kinds: &["comment"],
            container_kinds: &["block"],
        }),
        Language::Java => Some(Grammar {
            language: || tree_sitter_java::LANGUAGE.into(),
            mappings: JAVA_MAPPINGS,
            comment_kinds: &["line_comment", "block_comment"],
            container_kinds: &["class_body", "interface_body"],
        }),
        Language::C => Some(Grammar {
            language: || tree_sitter_c::LANGUAGE.into(),
            mappings: C_MAPPINGS,
            comment_kinds: &["comment"],
            container_kinds: &["field_declaration_list"],
        }),
        Language::Cpp => Some(Grammar {
            language: || tree_sitter_cpp::LANGUAGE.into(),
            mappings: CPP_MAPPINGS,
            comment_kinds: &["comment"],
            container_kinds: &["field_declaration_list"],
        }),
        Language::CSharp => Some(Grammar {
            language: || tree_sitter_c_sharp::LANGUAGE.into(),
            mappings: CSHARP_MAPPINGS,
            comment_kinds: &["comment"],
            container_kinds: &["declaration_list"],
        }),
        Language::Unknown => None,
    }
}

static RUST_MAPPINGS: &[KindMapping] = &[
    KindMapping {
        node_kind: "function_item",
        top_level: ObjectKind::Function,
        nested: Some(ObjectKind::Method),
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "struct_item",
        top_level: ObjectKind::Struct,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "enum_item",
        top_level: ObjectKind::Enum,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "trait_item",
        top_level: ObjectKind::Trait,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "impl_item",
        top_level: ObjectKind::Impl,
        nested: None,
        name_fields: &["type"],
    },
    KindMapping {
        node_kind: "mod_item",
        top_level: ObjectKind::Module,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "type_item",
        top_level: ObjectKind::TypeAlias,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "static_item",
        top_level: ObjectKind::Variable,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "const_item",
        top_level: ObjectKind::Variable,
        nested: None,
        name_fields: &["name"],
    },
];

static PYTHON_MAPPINGS: &[KindMapping] = &[
    KindMapping {
        node_kind: "function_definition",
        top_level: ObjectKind::Function,
        nested: Some(ObjectKind::Method),
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "class_definition",
        top_level: ObjectKind::Class,
        nested: None,
        name_fields: &["name"],
    },
];

static JS_MAPPINGS: &[KindMapping] = &[
    KindMapping {
        node_kind: "function_declaration",
        top_level: ObjectKind::Function,
        nested: Some(ObjectKind::Method),
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "class_declaration",
        top_level: ObjectKind::Class,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "method_definition",
        top_level: ObjectKind::Method,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "lexical_declaration",
        top_level: ObjectKind::Variable,
        nested: None,
        name_fields: &[],
    },
];

static TS_MAPPINGS: &[KindMapping] = &[
    KindMapping {
        node_kind: "function_declaration",
        top_level: ObjectKind::Function,
        nested: Some(ObjectKind::Method),
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "class_declaration",
        top_level: ObjectKind::Class,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "method_definition",
        top_level: ObjectKind::Method,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "interface_declaration",
        top_level: ObjectKind::Interface,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "type_alias_declaration",
        top_level: ObjectKind::TypeAlias,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "lexical_declaration",
        top_level: ObjectKind::Variable,
        nested: None,
        name_fields: &[],
    },
];

static GO_MAPPINGS: &[KindMapping] = &[
    KindMapping {
        node_kind: "function_declaration",
        top_level: ObjectKind::Function,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "method_declaration",
        top_level: ObjectKind::Method,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "type_spec",
        top_level: ObjectKind::Struct,
        nested: None,
        name_fields: &["name"],
    },
];

static JAVA_MAPPINGS: &[KindMapping] = &[
    KindMapping {
        node_kind: "class_declaration",
        top_level: ObjectKind::Class,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "interface_declaration",
        top_level: ObjectKind::Interface,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "method_declaration",
        top_level: ObjectKind::Method,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "enum_declaration",
        top_level: ObjectKind::Enum,
        nested: None,
        name_fields: &["name"],
    },
];

static C_MAPPINGS: &[KindMapping] = &[
    KindMapping {
        node_kind: "function_definition",
        top_level: ObjectKind::Function,
        nested: None,
        name_fields: &["declarator"],
    },
    KindMapping {
        node_kind: "struct_specifier",
        top_level: ObjectKind::Struct,
        nested: None,
        name_fields: &["name"],
    },
];

static CPP_MAPPINGS: &[KindMapping] = &[
    KindMapping {
        node_kind: "function_definition",
        top_level: ObjectKind::Function,
        nested: Some(ObjectKind::Method),
        name_fields: &["declarator"],
    },
    KindMapping {
        node_kind: "class_specifier",
        top_level: ObjectKind::Class,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "struct_specifier",
        top_level: ObjectKind::Struct,
        nested: None,
        name_fields: &["name"],
    },
];

static CSHARP_MAPPINGS: &[KindMapping] = &[
    KindMapping {
        node_kind: "class_declaration",
        top_level: ObjectKind::Class,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "interface_declaration",
        top_level: ObjectKind::Interface,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "method_declaration",
        top_level: ObjectKind::Method,
        nested: None,
        name_fields: &["name"],
    },
    KindMapping {
        node_kind: "struct_declaration",
        top_level: ObjectKind::Struct,
        nested: None,
        name_fields: &["name"],
    },
];
