//! Response comparison.
//!
//! # Responsibilities
//! - Compare status code and protocol version of a primary/shadow response pair
//! - Diff header maps after dropping ignored header names
//! - Delegate body comparison using each side's own `Content-Type`
//!
//! # Design Decisions
//! - No default ignore list: callers decide which headers legitimately differ
//! - Header names are compared lowercase; multi-valued headers compare in order
//! - Inputs are borrowed and never mutated, so comparison can run on any task

use std::collections::{BTreeMap, HashSet};

use axum::http::HeaderMap;
use serde::Serialize;

use crate::mirror::body_diff::{BodyDiffResult, BodyDiffer};
use crate::mirror::capture::CapturedResponse;
use crate::mirror::map_diff::{diff_maps, MapDiffResult};

/// Header diff keyed by lowercase header name.
pub type HeaderDiffResult = MapDiffResult<String, Vec<String>>;

/// Options applied to every comparison.
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    ignore_headers: HashSet<String>,
}

impl DiffOptions {
    /// Ignore the given header names (case-insensitive) on both sides.
    pub fn ignoring<I>(headers: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self {
            ignore_headers: headers
                .into_iter()
                .map(|h| h.as_ref().trim().to_ascii_lowercase())
                .collect(),
        }
    }

    /// True when `name` is excluded from comparison.
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore_headers.contains(&name.to_ascii_lowercase())
    }
}

/// A scalar compared across both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueDiff<T> {
    pub main: T,
    pub shadow: T,
    pub changed: bool,
}

impl<T: PartialEq> ValueDiff<T> {
    fn new(main: T, shadow: T) -> Self {
        let changed = main != shadow;
        Self {
            main,
            shadow,
            changed,
        }
    }
}

/// Structural diff of one primary/shadow response pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseDiffResult {
    pub status: ValueDiff<u16>,
    pub protocol: ValueDiff<String>,
    pub headers: HeaderDiffResult,
    pub body: BodyDiffResult,
}

impl ResponseDiffResult {
    /// True when no compared field differs.
    pub fn is_equal(&self) -> bool {
        self.changed_fields().is_empty()
    }

    /// Names of the fields that differ.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.status.changed {
            fields.push("status");
        }
        if self.protocol.changed {
            fields.push("protocol");
        }
        if self.headers.has_differences() {
            fields.push("headers");
        }
        if !self.body.equal {
            fields.push("body");
        }
        fields
    }
}

/// Compares captured responses.
#[derive(Debug, Clone, Default)]
pub struct ResponseDiffer {
    options: DiffOptions,
    body: BodyDiffer,
}

impl ResponseDiffer {
    pub fn new(options: DiffOptions, body: BodyDiffer) -> Self {
        Self { options, body }
    }

    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Diff `main` against `shadow`.
    ///
    /// Both sides always carry a header map, so comparison cannot fail; parse
    /// problems surface inside [`BodyDiffResult::failure`].
    pub fn compare(
        &self,
        main: &CapturedResponse,
        shadow: &CapturedResponse,
    ) -> ResponseDiffResult {
        let main_headers = header_map(&main.headers, &self.options);
        let shadow_headers = header_map(&shadow.headers, &self.options);

        ResponseDiffResult {
            status: ValueDiff::new(main.code(), shadow.code()),
            protocol: ValueDiff::new(main.protocol(), shadow.protocol()),
            headers: diff_maps(&main_headers, &shadow_headers, |a, b| a == b),
            body: self.body.diff(
                &main.body,
                main.content_type(),
                &shadow.body,
                shadow.content_type(),
            ),
        }
    }
}

/// Collect headers into `name → values`, keeping value order and skipping ignored names.
///
/// Values that are not valid UTF-8 are compared lossily.
pub fn header_map(headers: &HeaderMap, options: &DiffOptions) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        if options.is_ignored(name.as_str()) {
            continue;
        }
        map.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    map
}
