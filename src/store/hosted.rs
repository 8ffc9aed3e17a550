use super::{Row, Scalar, Store};
use crate::{Error, Result};

/// A hosted sqlite-dialect database behind a json query endpoint
/// (cloudflare d1's `/query` shape).
pub struct HostedStore {
    url: String,
    token: String,
}

#[derive(serde::Serialize)]
struct QueryBody<'a> {
    sql: &'a str,
    params: &'a [Scalar],
}

#[derive(serde::Deserialize, Debug)]
struct QueryEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
    #[serde(default)]
    result: Vec<QueryResult>,
}

#[derive(serde::Deserialize, Debug)]
struct QueryResult {
    #[serde(default)]
    results: Vec<Row>,
}

impl HostedStore {
    pub fn new(url: &str, token: &str) -> Self {
        Self {
            url: url.to_string(),
            token: token.to_string(),
        }
    }
}

fn unwrap_envelope(envelope: QueryEnvelope) -> Result<Vec<Row>> {
    if !envelope.success {
        return Err(Error::Store(format!(
            "query unsuccessful: {}",
            serde_json::Value::Array(envelope.errors)
        )));
    }
    Ok(envelope
        .result
        .into_iter()
        .next()
        .map(|r| r.results)
        .unwrap_or_default())
}

#[async_trait::async_trait]
impl Store for HostedStore {
    async fn execute(&self, sql: &str, params: &[Scalar]) -> Result<Vec<Row>> {
        let body = surf::Body::from_json(&QueryBody { sql, params })
            .map_err(|e| Error::Store(format!("query body error {}", e)))?;
        let mut resp = surf::post(self.url.as_str())
            .header("authorization", format!("Bearer {}", self.token))
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Store(format!("query request error {}", e)))?;
        if !resp.status().is_success() {
            let text = resp.body_string().await.unwrap_or_default();
            return Err(Error::Store(format!(
                "query failed: {} {}",
                resp.status(),
                text
            )));
        }
        let envelope: QueryEnvelope = resp
            .body_json()
            .await
            .map_err(|e| Error::Store(format!("query response json error {}", e)))?;
        unwrap_envelope(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_result_set_is_returned() {
        let envelope: QueryEnvelope = serde_json::from_value(serde_json::json!({
            "success": true,
            "errors": [],
            "result": [{
                "results": [{"id": 1, "name": "Air"}],
                "success": true,
                "meta": {"changes": 0}
            }]
        }))
        .unwrap();
        let rows = unwrap_envelope(envelope).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].int("id").unwrap(), 1);
    }

    #[test]
    fn unsuccessful_queries_are_errors() {
        let envelope: QueryEnvelope = serde_json::from_value(serde_json::json!({
            "success": false,
            "errors": [{"code": 7500, "message": "no such table: scrobbles"}],
            "result": []
        }))
        .unwrap();
        let err = unwrap_envelope(envelope).unwrap_err();
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn query_body_shape() {
        let params = crate::params![1i64, "Air"];
        let body = serde_json::to_value(&QueryBody {
            sql: "select ?",
            params: &params,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"sql": "select ?", "params": [1, "Air"]}));
    }
}
