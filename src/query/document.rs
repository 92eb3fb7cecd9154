//! Query document parsing
//!
//! Thin layer over the async-graphql parser: parses the document text,
//! substitutes variables, and flattens the operation into the engine's own
//! [`SelectionNode`] tree. Validation against the synthesized schema happens
//! later, in translation.

use async_graphql::parser::types::{DocumentOperations, OperationType, Selection, SelectionSet};
use async_graphql::parser::{parse_query, Positioned};
use async_graphql::{Value, Variables};
use indexmap::IndexMap;

use crate::error::EngineError;

/// A node in the caller's requested output tree
///
/// Transient, one tree per request.
#[derive(Debug, Clone)]
pub struct SelectionNode {
    pub name: String,
    pub alias: Option<String>,
    /// Arguments with variables already substituted
    pub arguments: IndexMap<String, Value>,
    pub children: Vec<SelectionNode>,
}

impl SelectionNode {
    /// The key this node occupies in the response object
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }
}

/// Parse a query document into root selection nodes
///
/// Rejects anything outside the read-only selection grammar: mutations,
/// subscriptions, fragments, and multi-operation documents.
pub fn parse_document(text: &str, variables: &Variables) -> Result<Vec<SelectionNode>, EngineError> {
    let document = parse_query(text).map_err(|e| EngineError::Parse(e.to_string()))?;

    let operation = match document.operations {
        DocumentOperations::Single(op) => op,
        DocumentOperations::Multiple(ops) => {
            let mut iter = ops.into_iter();
            match (iter.next(), iter.next()) {
                (Some((_, op)), None) => op,
                (None, _) => {
                    return Err(EngineError::Parse(
                        "document contains no operation".to_string(),
                    ));
                }
                _ => {
                    return Err(EngineError::Parse(
                        "documents with multiple operations are not supported".to_string(),
                    ));
                }
            }
        }
    };

    if operation.node.ty != OperationType::Query {
        return Err(EngineError::Parse(
            "only query operations are supported; the engine is read-only".to_string(),
        ));
    }

    let roots = convert_selection_set(&operation.node.selection_set, variables)?;
    if roots.is_empty() {
        return Err(EngineError::Parse("empty selection set".to_string()));
    }
    Ok(roots)
}

fn convert_selection_set(
    set: &Positioned<SelectionSet>,
    variables: &Variables,
) -> Result<Vec<SelectionNode>, EngineError> {
    let mut nodes = Vec::with_capacity(set.node.items.len());
    for item in &set.node.items {
        match &item.node {
            Selection::Field(field) => {
                let mut arguments = IndexMap::new();
                for (name, value) in &field.node.arguments {
                    let resolved = value.node.clone().into_const_with(|var| {
                        variables
                            .get(&var)
                            .cloned()
                            .ok_or_else(|| EngineError::Parse(format!("undefined variable ${var}")))
                    })?;
                    arguments.insert(name.node.to_string(), resolved);
                }
                nodes.push(SelectionNode {
                    name: field.node.name.node.to_string(),
                    alias: field.node.alias.as_ref().map(|a| a.node.to_string()),
                    arguments,
                    children: convert_selection_set(&field.node.selection_set, variables)?,
                });
            }
            Selection::FragmentSpread(_) | Selection::InlineFragment(_) => {
                return Err(EngineError::Parse("fragments are not supported".to_string()));
            }
        }
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parses_nested_selection_with_aliases_and_arguments() {
        let doc = r#"
            query {
                novels: Books(where: {title: {EQ: "Dune"}}) {
                    select { title author { name } }
                }
            }
        "#;
        let roots = parse_document(doc, &Variables::default()).unwrap();

        assert_eq!(roots.len(), 1);
        let root = &roots[0];
        assert_eq!(root.name, "Books");
        assert_eq!(root.response_key(), "novels");
        assert!(root.argument("where").is_some());

        let select = &root.children[0];
        assert_eq!(select.name, "select");
        assert_eq!(select.children[1].name, "author");
        assert_eq!(select.children[1].children[0].name, "name");
    }

    #[test]
    fn substitutes_variables_into_arguments() {
        let doc = r#"
            query($t: String!) {
                Books(where: {title: {EQ: $t}}) { select { title } }
            }
        "#;
        let variables = Variables::from_json(serde_json::json!({"t": "Dune"}));
        let roots = parse_document(doc, &variables).unwrap();

        let filter = roots[0].argument("where").unwrap();
        assert_eq!(
            filter.to_string().contains("Dune"),
            true,
            "variable not substituted: {filter}"
        );
    }

    #[test]
    fn undefined_variable_is_a_parse_error() {
        let doc = "query { Books(where: {title: {EQ: $missing}}) { select { title } } }";
        assert_matches!(
            parse_document(doc, &Variables::default()),
            Err(EngineError::Parse(msg)) if msg.contains("missing")
        );
    }

    #[test]
    fn mutations_are_rejected() {
        let doc = "mutation { createBook { id } }";
        assert_matches!(
            parse_document(doc, &Variables::default()),
            Err(EngineError::Parse(msg)) if msg.contains("read-only")
        );
    }

    #[test]
    fn fragments_are_rejected() {
        let doc = r#"
            query { Books { ...bits } }
            fragment bits on Books { select { title } }
        "#;
        assert_matches!(
            parse_document(doc, &Variables::default()),
            Err(EngineError::Parse(msg)) if msg.contains("fragments")
        );
    }
}
