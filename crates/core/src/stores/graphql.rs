//! GraphQL `Get` query builders and response reshaping for Weaviate.

use crate::models::{GeneratedSource, GenerativeResult, SearchHit};
use crate::StoreError;
use serde_json::{Map, Value};

/// Quotes `text` as a GraphQL string literal.
fn literal(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

fn literal_list(items: &[String]) -> String {
    let quoted = items.iter().map(|item| literal(item)).collect::<Vec<_>>();
    format!("[{}]", quoted.join(", "))
}

fn get_query(class: &str, arguments: &str, properties: &[String], additional: &str) -> String {
    format!(
        "{{ Get {{ {class}({arguments}) {{ {fields} _additional {{ {additional} }} }} }} }}",
        fields = properties.join(" "),
    )
}

pub fn fetch_query(class: &str, limit: usize, properties: &[String]) -> String {
    get_query(class, &format!("limit: {limit}"), properties, "id")
}

pub fn near_text_query(class: &str, text: &str, limit: usize, properties: &[String]) -> String {
    let arguments = format!("nearText: {{concepts: [{}]}}, limit: {limit}", literal(text));
    get_query(class, &arguments, properties, "id distance certainty")
}

pub fn bm25_query(
    class: &str,
    text: &str,
    limit: usize,
    properties: &[String],
    search_properties: &[String],
) -> String {
    let mut bm25 = format!("query: {}", literal(text));
    if !search_properties.is_empty() {
        bm25.push_str(&format!(", properties: {}", literal_list(search_properties)));
    }
    let arguments = format!("bm25: {{{bm25}}}, limit: {limit}");
    get_query(class, &arguments, properties, "id score")
}

pub fn hybrid_query(class: &str, text: &str, alpha: f64, limit: usize, properties: &[String]) -> String {
    let arguments = format!(
        "hybrid: {{query: {}, alpha: {alpha}, fusionType: relativeScoreFusion}}, limit: {limit}",
        literal(text)
    );
    get_query(class, &arguments, properties, "id score")
}

pub fn generative_query(
    class: &str,
    text: &str,
    prompt: &str,
    grouped_task: Option<&str>,
    limit: usize,
    properties: &[String],
) -> String {
    let arguments = format!("nearText: {{concepts: [{}]}}, limit: {limit}", literal(text));
    let generate = match grouped_task {
        Some(task) => format!(
            "generate(singleResult: {{prompt: {}}}, groupedResult: {{task: {}}}) {{ singleResult groupedResult error }}",
            literal(prompt),
            literal(task)
        ),
        None => format!(
            "generate(singleResult: {{prompt: {}}}) {{ singleResult error }}",
            literal(prompt)
        ),
    };
    get_query(class, &arguments, properties, &format!("id {generate}"))
}

/// Fails with the joined messages when the response carries `errors`.
pub fn check_errors(response: &Value) -> Result<(), StoreError> {
    let errors = response
        .get("errors")
        .and_then(Value::as_array)
        .filter(|errors| !errors.is_empty());

    if let Some(errors) = errors {
        let messages = errors
            .iter()
            .map(|error| {
                error
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string())
            })
            .collect::<Vec<_>>();
        return Err(StoreError::GraphQl(messages.join("; ")));
    }
    Ok(())
}

fn objects<'a>(response: &'a Value, class: &str) -> Result<&'a Vec<Value>, StoreError> {
    check_errors(response)?;
    response
        .pointer(&format!("/data/Get/{class}"))
        .and_then(Value::as_array)
        .ok_or_else(|| StoreError::BackendResponse {
            backend: "weaviate".to_string(),
            details: format!("response has no Get.{class} array"),
        })
}

/// Weaviate reports scores as strings; distances as numbers.
fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

fn split_additional(object: &Value) -> (Map<String, Value>, Value) {
    let mut properties = object.as_object().cloned().unwrap_or_default();
    let additional = properties.remove("_additional").unwrap_or(Value::Null);
    (properties, additional)
}

fn object_id(additional: &Value) -> String {
    additional
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub fn parse_hits(response: &Value, class: &str) -> Result<Vec<SearchHit>, StoreError> {
    let hits = objects(response, class)?
        .iter()
        .map(|object| {
            let (properties, additional) = split_additional(object);
            SearchHit {
                uuid: object_id(&additional),
                properties,
                distance: number(additional.get("distance")),
                certainty: number(additional.get("certainty")),
                score: number(additional.get("score")),
            }
        })
        .collect();
    Ok(hits)
}

pub fn parse_generative(response: &Value, class: &str) -> Result<GenerativeResult, StoreError> {
    let mut result = GenerativeResult::default();

    for object in objects(response, class)? {
        let (properties, additional) = split_additional(object);
        let generate = additional.get("generate");

        if let Some(error) = generate.and_then(|g| g.get("error")).and_then(Value::as_str) {
            if !error.is_empty() {
                return Err(StoreError::GraphQl(error.to_string()));
            }
        }

        if result.generated_text.is_none() {
            result.generated_text = generate
                .and_then(|g| g.get("groupedResult"))
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        result.sources.push(GeneratedSource {
            uuid: object_id(&additional),
            properties,
            generated: generate
                .and_then(|g| g.get("singleResult"))
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props() -> Vec<String> {
        vec!["text".to_string(), "chunk_id".to_string()]
    }

    #[test]
    fn near_text_query_quotes_user_text() {
        let query = near_text_query("Pdf_for_mira", "say \"hi\"\nnow", 3, &props());
        assert_eq!(
            query,
            r#"{ Get { Pdf_for_mira(nearText: {concepts: ["say \"hi\"\nnow"]}, limit: 3) { text chunk_id _additional { id distance certainty } } } }"#
        );
    }

    #[test]
    fn bm25_query_lists_search_properties_only_when_given() {
        let without = bm25_query("Docs", "pump", 5, &props(), &[]);
        assert!(without.contains(r#"bm25: {query: "pump"}, limit: 5"#));

        let with = bm25_query("Docs", "pump", 5, &props(), &["text".to_string()]);
        assert!(with.contains(r#"bm25: {query: "pump", properties: ["text"]}"#));
        assert!(with.contains("_additional { id score }"));
    }

    #[test]
    fn hybrid_query_carries_alpha_and_fusion() {
        let query = hybrid_query("Docs", "pump", 0.25, 10, &props());
        assert!(query.contains("alpha: 0.25"));
        assert!(query.contains("fusionType: relativeScoreFusion"));
    }

    #[test]
    fn generative_query_adds_grouped_task_when_requested() {
        let single = generative_query("Docs", "pump", "Summarize {text}", None, 2, &props());
        assert!(single.contains(r#"generate(singleResult: {prompt: "Summarize {text}"}) { singleResult error }"#));

        let grouped = generative_query("Docs", "pump", "Summarize {text}", Some("Combine"), 2, &props());
        assert!(grouped.contains(r#"groupedResult: {task: "Combine"}"#));
        assert!(grouped.contains("singleResult groupedResult error"));
    }

    #[test]
    fn hits_are_parsed_with_string_scores() {
        let response = json!({
            "data": {"Get": {"Docs": [
                {"text": "pump", "chunk_id": 4, "_additional": {"id": "a1", "score": "0.75"}},
                {"text": "valve", "chunk_id": 5, "_additional": {"id": "a2", "distance": 0.2, "certainty": 0.9}}
            ]}}
        });

        let hits = parse_hits(&response, "Docs").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].uuid, "a1");
        assert_eq!(hits[0].score, Some(0.75));
        assert_eq!(hits[0].chunk_id(), Some(4));
        assert!(!hits[0].properties.contains_key("_additional"));
        assert_eq!(hits[1].distance, Some(0.2));
        assert_eq!(hits[1].text(), Some("valve"));
    }

    #[test]
    fn graphql_errors_surface_as_errors() {
        let response = json!({"errors": [{"message": "no such class"}], "data": null});
        let error = parse_hits(&response, "Docs").unwrap_err();
        assert!(matches!(error, StoreError::GraphQl(message) if message == "no such class"));
    }

    #[test]
    fn generative_response_collects_single_and_grouped_results() {
        let response = json!({
            "data": {"Get": {"Docs": [
                {"text": "one", "_additional": {"id": "x", "generate": {"singleResult": "S1", "groupedResult": "G", "error": null}}},
                {"text": "two", "_additional": {"id": "y", "generate": {"singleResult": "S2", "groupedResult": null, "error": null}}}
            ]}}
        });

        let result = parse_generative(&response, "Docs").unwrap();
        assert_eq!(result.generated_text.as_deref(), Some("G"));
        assert_eq!(result.sources.len(), 2);
        assert_eq!(result.sources[1].generated.as_deref(), Some("S2"));
    }
}
