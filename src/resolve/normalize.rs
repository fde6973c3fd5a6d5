//! Normalization of raw upstream metadata
//!
//! Versions are ordered with one strategy for the whole list, tried in turn:
//! index-style versions (`1.0rc1`, `2.0.post1`, `3.12`), then lenient semver,
//! then natural ordering. A single strategy per list keeps the ordering total.

use crate::error::ResolveError;
use crate::record::{MetadataDocument, ReleasePair};
use crate::registry::Entry;
use crate::upstream::RawMetadata;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Build the normalized document for `entry` from raw upstream data
pub fn normalize(entry: &Entry, raw: RawMetadata) -> Result<MetadataDocument, ResolveError> {
    let mut seen = HashSet::with_capacity(raw.versions.len());
    let mut releases = Vec::with_capacity(raw.versions.len());
    for version in raw.versions {
        let version = version.trim().to_string();
        if version.is_empty() {
            continue;
        }
        if version.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ResolveError::normalization(format!(
                "invalid version string {:?} for {}",
                version, entry.id
            )));
        }
        if seen.insert(version.clone()) {
            releases.push(version);
        }
    }

    sort_versions(&mut releases);

    let pairs = releases
        .windows(2)
        .map(|w| ReleasePair {
            old: w[0].clone(),
            new: w[1].clone(),
        })
        .collect();

    let mut extra = raw.extra;
    extra.insert(
        "source_url".to_string(),
        serde_json::Value::String(raw.source_url),
    );
    if !entry.metadata.is_empty() {
        let config = serde_json::to_value(&entry.metadata)
            .map_err(|e| ResolveError::normalization(format!("entry metadata: {}", e)))?;
        extra.insert("config".to_string(), config);
    }

    Ok(MetadataDocument {
        name: entry.canonical_locator(),
        ecosystem: entry.kind().ecosystem().to_string(),
        kind: entry.kind(),
        latest: releases.last().cloned(),
        releases,
        pairs,
        summary: raw.summary,
        extra,
    })
}

/// Sort versions ascending
pub fn sort_versions(versions: &mut [String]) {
    let index_keys: Option<Vec<IndexVersion>> =
        versions.iter().map(|v| IndexVersion::parse(v)).collect();
    if let Some(keys) = index_keys {
        sort_by_keys(versions, keys);
        return;
    }

    let semver_keys: Option<Vec<semver::Version>> =
        versions.iter().map(|v| lenient_semver(v)).collect();
    if let Some(keys) = semver_keys {
        sort_by_keys(versions, keys);
        return;
    }

    versions.sort_by(|a, b| natural_cmp(a, b));
}

fn sort_by_keys<K: Ord>(versions: &mut [String], keys: Vec<K>) {
    let mut keyed: Vec<(K, String)> = keys
        .into_iter()
        .zip(versions.iter().cloned())
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    for (slot, (_, version)) in versions.iter_mut().zip(keyed) {
        *slot = version;
    }
}

/// Coerce `3.12` to `3.12.0` and strip a leading `v`, then parse as semver
fn lenient_semver(version: &str) -> Option<semver::Version> {
    let v = version.strip_prefix('v').unwrap_or(version);
    if let Ok(parsed) = semver::Version::parse(v) {
        return Some(parsed);
    }
    let split = v.find(['-', '+']).unwrap_or(v.len());
    let (core, rest) = v.split_at(split);
    let parts = core.split('.').count();
    let padded = match parts {
        1 => format!("{}.0.0{}", core, rest),
        2 => format!("{}.0{}", core, rest),
        _ => return None,
    };
    semver::Version::parse(&padded).ok()
}

/// Sort key for index-style versions: `[N!]N(.N)*[{a|b|rc}N][.postN][.devN][+local]`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct IndexVersion {
    epoch: u64,
    release: Vec<u64>,
    /// (0, 0) dev-only release, (1..=3, n) alpha/beta/rc, (4, 0) final
    pre: (u8, u64),
    /// (0, 0) none, (1, n) postN
    post: (u8, u64),
    /// (0, n) devN, (1, 0) none
    dev: (u8, u64),
    local: String,
}

impl IndexVersion {
    fn parse(input: &str) -> Option<Self> {
        let lower = input.to_ascii_lowercase();
        let mut s = lower.strip_prefix('v').unwrap_or(&lower);

        let (s_local, local) = match s.split_once('+') {
            Some((head, local)) if !local.is_empty() => (head, local.to_string()),
            Some(_) => return None,
            None => (s, String::new()),
        };
        s = s_local;

        let mut epoch = 0;
        if let Some((e, rest)) = s.split_once('!') {
            epoch = e.parse().ok()?;
            s = rest;
        }

        let (mut release, rest) = take_release(s)?;
        while release.len() > 1 && release.last() == Some(&0) {
            release.pop();
        }
        let mut rest = rest;

        let mut pre = None;
        for (tag, rank) in [
            ("alpha", 1),
            ("beta", 2),
            ("preview", 3),
            ("pre", 3),
            ("rc", 3),
            ("a", 1),
            ("b", 2),
            ("c", 3),
        ] {
            let trimmed = rest.trim_start_matches(['.', '-', '_']);
            if let Some(after) = trimmed.strip_prefix(tag) {
                let after = after.trim_start_matches(['.', '-', '_']);
                let (n, remaining) = take_number(after);
                pre = Some((rank, n.unwrap_or(0)));
                rest = remaining;
                break;
            }
        }

        let mut post = None;
        let trimmed = rest.trim_start_matches(['.', '-', '_']);
        if let Some(after) = trimmed
            .strip_prefix("post")
            .or_else(|| trimmed.strip_prefix("rev"))
            .or_else(|| trimmed.strip_prefix('r'))
        {
            let (n, remaining) = take_number(after.trim_start_matches(['.', '-', '_']));
            post = Some(n.unwrap_or(0));
            rest = remaining;
        } else if let Some(after) = rest.strip_prefix('-') {
            let (n, remaining) = take_number(after);
            if let Some(n) = n {
                post = Some(n);
                rest = remaining;
            }
        }

        let mut dev = None;
        let trimmed = rest.trim_start_matches(['.', '-', '_']);
        if let Some(after) = trimmed.strip_prefix("dev") {
            let (n, remaining) = take_number(after);
            dev = Some(n.unwrap_or(0));
            rest = remaining;
        }

        if !rest.is_empty() {
            return None;
        }

        let pre_key = match (pre, post, dev) {
            (Some((rank, n)), _, _) => (rank, n),
            (None, None, Some(_)) => (0, 0),
            (None, _, _) => (4, 0),
        };

        Some(Self {
            epoch,
            release,
            pre: pre_key,
            post: post.map_or((0, 0), |n| (1, n)),
            dev: dev.map_or((1, 0), |n| (0, n)),
            local,
        })
    }
}

fn take_number(s: &str) -> (Option<u64>, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return (None, s);
    }
    (s[..end].parse().ok(), &s[end..])
}

fn take_release(s: &str) -> Option<(Vec<u64>, &str)> {
    let mut release = Vec::new();
    let mut rest = s;
    loop {
        let (n, remaining) = take_number(rest);
        release.push(n?);
        rest = remaining;
        match rest.strip_prefix('.') {
            Some(after) if after.starts_with(|c: char| c.is_ascii_digit()) => rest = after,
            _ => break,
        }
    }
    Some((release, rest))
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Segment<'a> {
    Num(u64),
    Text(&'a str),
}

fn segments(s: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.starts_with(|c: char| c.is_ascii_digit());
        let end = rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(end);
        out.push(match head.parse() {
            Ok(n) if digits => Segment::Num(n),
            _ => Segment::Text(head),
        });
        rest = tail;
    }
    out
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    segments(a).cmp(&segments(b)).then_with(|| a.cmp(b))
}
