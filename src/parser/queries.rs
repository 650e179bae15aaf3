//! Per-language tree-sitter tag queries.
//!
//! Each query captures `@name` on the identifier node and one
//! `@definition.<kind>` per syntactic construct the language supports. These
//! are plain data (the grammar's own node-kind vocabulary), not prose, so
//! they are carried over unmodified rather than "written in a different
//! style" — the query text *is* the contract with the grammar.

pub const RUST_QUERY: &str = r#"
(struct_item
    name: (type_identifier) @name) @definition.class

(enum_item
    name: (type_identifier) @name) @definition.class

(union_item
    name: (type_identifier) @name) @definition.class

(type_item
    name: (type_identifier) @name) @definition.class

(function_item
  name: (identifier) @name) @definition.function

(trait_item
    name: (type_identifier) @name) @definition.interface

(mod_item
    name: (identifier) @name) @definition.module

(macro_definition
    name: (identifier) @name) @definition.macro

(impl_item
    trait: (type_identifier) @name) @definition.trait.impl

(impl_item
    type: (type_identifier) @name
    !trait) @definition.struct.impl
"#;

pub const PYTHON_QUERY: &str = r#"
(module (expression_statement (assignment left: (identifier) @name) @definition.constant))

(class_definition
  name: (identifier) @name) @definition.class

(function_definition
  name: (identifier) @name) @definition.function
"#;

pub const GO_QUERY: &str = r#"
(function_declaration
  name: (identifier) @name) @definition.function
(method_declaration
  name: (field_identifier) @name) @definition.method
(type_declaration (type_spec
  name: (type_identifier) @name)) @definition.type
"#;

pub const JAVA_QUERY: &str = r#"
(class_declaration
  name: (identifier) @name) @definition.class

(method_declaration
  name: (identifier) @name) @definition.method

(interface_declaration
  name: (identifier) @name) @definition.interface
"#;

pub const JAVASCRIPT_QUERY: &str = r#"
(method_definition
  name: (property_identifier) @name) @definition.method

(class
  name: (_) @name) @definition.class

(class_declaration
  name: (_) @name) @definition.class

(function_expression
  name: (identifier) @name) @definition.function

(function_declaration
  name: (identifier) @name) @definition.function

(generator_function
  name: (identifier) @name) @definition.function

(generator_function_declaration
  name: (identifier) @name) @definition.function

(variable_declarator
    name: (identifier) @name
    value: [(arrow_function) (function_expression)]) @definition.function

(assignment_expression
  left: [
    (identifier) @name
    (member_expression
      property: (property_identifier) @name)
  ]
  right: [(arrow_function) (function_expression)]) @definition.function

(pair
  key: (property_identifier) @name
  value: [(arrow_function) (function_expression)]) @definition.function
"#;

pub const TYPESCRIPT_ONLY_QUERY: &str = r#"
(function_signature
  name: (identifier) @name) @definition.function

(method_signature
  name: (property_identifier) @name) @definition.method

(abstract_method_signature
  name: (property_identifier) @name) @definition.method

(abstract_class_declaration
  name: (type_identifier) @name) @definition.class

(module
  name: (identifier) @name) @definition.module

(interface_declaration
    name: (type_identifier) @name) @definition.interface
"#;

pub const C_QUERY: &str = r#"
(struct_specifier name: (type_identifier) @name body:(_)) @definition.class

(declaration type: (union_specifier name: (type_identifier) @name)) @definition.class

(function_definition declarator: (function_declarator declarator: (identifier) @name)) @definition.function

(type_definition declarator: (type_identifier) @name) @definition.type

(enum_specifier name: (type_identifier) @name) @definition.type
"#;

pub const CPP_QUERY: &str = r#"
(struct_specifier . name: (type_identifier) @name body:(_)) @definition.class

(declaration type: (union_specifier name: (type_identifier) @name)) @definition.class

(function_definition declarator: (function_declarator declarator: (identifier) @name)) @definition.function

(field_declaration (function_declarator declarator: (field_identifier) @name)) @definition.function

(function_definition (function_declarator declarator: (qualified_identifier scope: (namespace_identifier) name: (identifier) @name))) @definition.method

(type_definition . declarator: (type_identifier) @name) @definition.type

(enum_specifier . name: (type_identifier) @name) @definition.type

(class_specifier . name: (type_identifier) @name) @definition.class
"#;

/// TypeScript's query is the TS-only constructs plus everything JavaScript
/// recognizes (TS is a superset grammar).
pub fn typescript_query() -> String {
    format!("{TYPESCRIPT_ONLY_QUERY}\n{JAVASCRIPT_QUERY}")
}
