//! Remote RDF triple-store backend, speaking the SPARQL 1.1 protocol over HTTP.
//!
//! The cache's normalized triples live in a dedicated named graph on the
//! remote service; the lifecycle marker lives in a separate admin graph so
//! data and metadata never mix. `INSERT DATA` is idempotent under RDF set
//! semantics, which is what makes the populator's retry-on-transient-failure
//! policy safe: re-submitting a batch can never duplicate anything.
//!
//! Protocol and transport errors are translated into the same [`StoreError`]
//! taxonomy as the local backends, so callers stay backend-agnostic.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::config::RemoteConfig;
use crate::error::StoreError;
use crate::model::{CacheState, EtextId, Triple};
use crate::store::{MetadataStore, StoreResult};
use crate::vocabulary::{EBOOK_NS, Predicate};

/// Named graph holding the metadata triples.
const DATA_GRAPH: &str = "urn:gutencache:metadata";
/// Named graph holding the lifecycle marker.
const ADMIN_GRAPH: &str = "urn:gutencache:admin";
const STATE_SUBJECT: &str = "urn:gutencache:cache";
const STATE_PREDICATE: &str = "urn:gutencache:state";

const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// Remote SPARQL triple-store metadata store.
pub struct RemoteStore {
    agent: ureq::Agent,
    endpoint: String,
    auth: Option<String>,
    max_retries: u32,
}

impl RemoteStore {
    /// Connect to a remote triple-store endpoint.
    ///
    /// Verifies reachability with a trivial ASK query up front, so an
    /// unreachable or misconfigured endpoint surfaces as
    /// [`StoreError::Unavailable`] at selection time rather than mid-population.
    pub fn connect(config: &RemoteConfig) -> StoreResult<Self> {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        let auth = match (&config.user, &config.password) {
            (Some(user), Some(password)) => Some(basic_auth(user, password)),
            (Some(user), None) => Some(basic_auth(user, "")),
            _ => None,
        };
        let store = Self {
            agent,
            endpoint: config.endpoint.clone(),
            auth,
            max_retries: config.max_retries,
        };

        store.query("ASK WHERE {}").map_err(|e| StoreError::Unavailable {
            backend: "remote_triplestore",
            location: config.endpoint.clone(),
            reason: e.to_string(),
        })?;
        Ok(store)
    }

    /// POST a form-encoded SPARQL request, retrying transport failures.
    ///
    /// Retrying is safe for queries (read-only) and for updates (INSERT DATA
    /// is idempotent). HTTP status errors (auth, bad request) are not
    /// retried; they will not heal on their own.
    fn send(&self, kind: &'static str, body: &str) -> StoreResult<ureq::Response> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut request = self.agent.post(&self.endpoint);
            if kind == "query" {
                request = request.set("Accept", SPARQL_RESULTS_JSON);
            }
            if let Some(auth) = &self.auth {
                request = request.set("Authorization", auth);
            }
            match request.send_form(&[(kind, body)]) {
                Ok(response) => return Ok(response),
                Err(ureq::Error::Status(code, response)) => {
                    let detail = response.into_string().unwrap_or_default();
                    return Err(StoreError::Remote {
                        message: format!("{kind} rejected with HTTP {code}: {detail}"),
                    });
                }
                Err(ureq::Error::Transport(transport)) => {
                    if attempt > self.max_retries {
                        return Err(StoreError::Remote {
                            message: format!(
                                "{kind} failed after {attempt} attempts: {transport}"
                            ),
                        });
                    }
                    tracing::warn!(attempt, error = %transport, "transient SPARQL transport error, retrying");
                    std::thread::sleep(Duration::from_millis(250 * u64::from(attempt)));
                }
            }
        }
    }

    fn query(&self, sparql: &str) -> StoreResult<serde_json::Value> {
        let response = self.send("query", sparql)?;
        response.into_json().map_err(|e| StoreError::Remote {
            message: format!("cannot parse SPARQL results: {e}"),
        })
    }

    fn update(&self, sparql: &str) -> StoreResult<()> {
        self.send("update", sparql).map(|_| ())
    }
}

impl MetadataStore for RemoteStore {
    fn put_batch(&self, triples: &[Triple]) -> StoreResult<()> {
        if triples.is_empty() {
            return Ok(());
        }
        self.update(&render_insert_data(triples))
    }

    fn get_attributes(&self, etext: EtextId) -> StoreResult<BTreeSet<(Predicate, String)>> {
        let sparql = format!(
            "SELECT ?p ?v WHERE {{ GRAPH <{DATA_GRAPH}> {{ <{EBOOK_NS}{}> ?p ?v }} }}",
            etext.get()
        );
        let results = self.query(&sparql)?;

        let mut attrs = BTreeSet::new();
        for binding in bindings(&results) {
            let (Some(p), Some(v)) = (binding_value(binding, "p"), binding_value(binding, "v"))
            else {
                continue;
            };
            if let Some(predicate) = Predicate::from_iri(p) {
                attrs.insert((predicate, v.to_string()));
            }
        }
        Ok(attrs)
    }

    fn find_etexts(&self, predicate: Predicate, value: &str) -> StoreResult<BTreeSet<EtextId>> {
        let sparql = format!(
            "SELECT ?s WHERE {{ GRAPH <{DATA_GRAPH}> {{ ?s <{}> \"{}\" }} }}",
            predicate.iri(),
            escape_literal(value)
        );
        let results = self.query(&sparql)?;

        let mut ids = BTreeSet::new();
        for binding in bindings(&results) {
            if let Some(id) = binding_value(binding, "s").and_then(parse_ebook_iri) {
                ids.insert(id);
            }
        }
        Ok(ids)
    }

    fn list_predicates(&self) -> StoreResult<BTreeSet<Predicate>> {
        let sparql =
            format!("SELECT DISTINCT ?p WHERE {{ GRAPH <{DATA_GRAPH}> {{ ?s ?p ?v }} }}");
        let results = self.query(&sparql)?;

        let mut predicates = BTreeSet::new();
        for binding in bindings(&results) {
            if let Some(predicate) = binding_value(binding, "p").and_then(Predicate::from_iri) {
                predicates.insert(predicate);
            }
        }
        Ok(predicates)
    }

    fn state(&self) -> StoreResult<CacheState> {
        let sparql = format!(
            "SELECT ?state WHERE {{ GRAPH <{ADMIN_GRAPH}> {{ <{STATE_SUBJECT}> <{STATE_PREDICATE}> ?state }} }}"
        );
        let results = self.query(&sparql)?;

        match bindings(&results)
            .iter()
            .find_map(|b| binding_value(b, "state"))
        {
            Some(raw) => CacheState::parse(raw).ok_or_else(|| StoreError::Corrupt {
                message: format!("unrecognized state marker \"{raw}\""),
            }),
            None => Ok(CacheState::Empty),
        }
    }

    fn set_state(&self, state: CacheState) -> StoreResult<()> {
        self.update(&render_set_state(state))
    }

    fn clear(&self) -> StoreResult<()> {
        self.update(&format!(
            "DROP SILENT GRAPH <{DATA_GRAPH}> ; DROP SILENT GRAPH <{ADMIN_GRAPH}>"
        ))
    }
}

impl std::fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStore")
            .field("endpoint", &self.endpoint)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SPARQL rendering and response walking
// ---------------------------------------------------------------------------

fn render_insert_data(triples: &[Triple]) -> String {
    let mut out = String::with_capacity(triples.len() * 96);
    out.push_str("INSERT DATA { GRAPH <");
    out.push_str(DATA_GRAPH);
    out.push_str("> {\n");
    for t in triples {
        out.push_str(&format!(
            "<{EBOOK_NS}{}> <{}> \"{}\" .\n",
            t.etext.get(),
            t.predicate.iri(),
            escape_literal(&t.value)
        ));
    }
    out.push_str("} }");
    out
}

fn render_set_state(state: CacheState) -> String {
    format!(
        "DELETE WHERE {{ GRAPH <{ADMIN_GRAPH}> {{ <{STATE_SUBJECT}> <{STATE_PREDICATE}> ?old }} }} ;\n\
         INSERT DATA {{ GRAPH <{ADMIN_GRAPH}> {{ <{STATE_SUBJECT}> <{STATE_PREDICATE}> \"{}\" }} }}",
        state.as_str()
    )
}

/// Escape a string for embedding in a double-quoted SPARQL literal.
fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// The `results.bindings` array of a sparql-results+json document.
fn bindings(results: &serde_json::Value) -> Vec<&serde_json::Value> {
    results["results"]["bindings"]
        .as_array()
        .map(|rows| rows.iter().collect())
        .unwrap_or_default()
}

fn binding_value<'a>(binding: &'a serde_json::Value, var: &str) -> Option<&'a str> {
    binding[var]["value"].as_str()
}

/// Parse an etext id out of an ebook entity IRI.
fn parse_ebook_iri(iri: &str) -> Option<EtextId> {
    iri.strip_prefix(EBOOK_NS)?
        .parse::<u64>()
        .ok()
        .and_then(EtextId::new)
}

fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", base64_encode(format!("{user}:{password}").as_bytes()))
}

/// Minimal base64 encoder (avoids adding a base64 crate dependency).
fn base64_encode(input: &[u8]) -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut result = String::with_capacity(input.len().div_ceil(3) * 4);
    for chunk in input.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = if chunk.len() > 1 { chunk[1] as u32 } else { 0 };
        let b2 = if chunk.len() > 2 { chunk[2] as u32 } else { 0 };
        let triple = (b0 << 16) | (b1 << 8) | b2;
        result.push(CHARS[((triple >> 18) & 0x3F) as usize] as char);
        result.push(CHARS[((triple >> 12) & 0x3F) as usize] as char);
        if chunk.len() > 1 {
            result.push(CHARS[((triple >> 6) & 0x3F) as usize] as char);
        } else {
            result.push('=');
        }
        if chunk.len() > 2 {
            result.push(CHARS[(triple & 0x3F) as usize] as char);
        } else {
            result.push('=');
        }
    }
    result
}
