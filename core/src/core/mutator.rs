use url::form_urlencoded;
use url::Url;

use crate::error::ScanError;

/// One `name=value` piece of the query, decoded for matching and kept raw
/// for reproduction.
#[derive(Debug, Clone, PartialEq)]
struct QueryPiece {
    raw: String,
    raw_name: String,
}

/// A target URL parsed once into its base and an ordered list of query
/// parameters.
///
/// Parameter order is preserved so that every probe URL differs from the
/// target in exactly one position. Repeated names are kept as separate
/// entries and addressed by index.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTarget {
    url: Url,
    params: Vec<(String, String)>,
    pieces: Vec<QueryPiece>,
}

impl ParamTarget {
    /// Parses `raw`, requiring at least one named query parameter.
    pub fn parse(raw: &str) -> Result<Self, ScanError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| ScanError::Input(format!("invalid target URL '{}': {}", raw.trim(), e)))?;

        let mut params = Vec::new();
        let mut pieces = Vec::new();
        for piece in url.query().unwrap_or("").split('&').filter(|p| !p.is_empty()) {
            let Some((name, value)) = form_urlencoded::parse(piece.as_bytes()).next() else {
                continue;
            };
            params.push((name.into_owned(), value.into_owned()));
            pieces.push(QueryPiece {
                raw: piece.to_string(),
                raw_name: piece.split('=').next().unwrap_or(piece).to_string(),
            });
        }

        if !params.iter().any(|(name, _)| !name.is_empty()) {
            return Err(ScanError::Input(
                "Target URL must have parameters (e.g., ?id=1)".to_string(),
            ));
        }

        Ok(Self { url, params, pieces })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Indices of the parameters that can be injected (named ones).
    pub fn injection_points(&self) -> Vec<usize> {
        self.params
            .iter()
            .enumerate()
            .filter(|(_, (name, _))| !name.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn param_name(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(|(name, _)| name.as_str())
    }

    /// Builds the probe URL: byte-for-byte the target except the value of the
    /// parameter at `index`, which carries the form-encoded `payload`.
    ///
    /// Form encoding keeps `&`, `=` and `?` inside a payload within the
    /// mutated value.
    pub fn probe_url(&self, index: usize, payload: &str) -> Url {
        let query = self
            .pieces
            .iter()
            .enumerate()
            .map(|(i, piece)| {
                if i == index {
                    let encoded: String = form_urlencoded::byte_serialize(payload.as_bytes()).collect();
                    format!("{}={}", piece.raw_name, encoded)
                } else {
                    piece.raw.clone()
                }
            })
            .collect::<Vec<_>>()
            .join("&");

        let mut url = self.url.clone();
        url.set_query(Some(&query));
        url
    }
}
