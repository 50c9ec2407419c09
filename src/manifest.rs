use std::collections::BTreeMap;
use std::collections::btree_map;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Location;
use crate::domain::Member;
use crate::error::RetrieveError;
use crate::template::{Context, Template, TemplateError, Value};

/// Target file name (relative to the output directory) to fully expanded
/// source address, for one attempt against one data store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, replacing any earlier source for the same target.
    pub fn insert(&mut self, target: impl Into<String>, source: impl Into<String>) {
        self.entries.insert(target.into(), source.into());
    }

    pub fn get(&self, target: &str) -> Option<&str> {
        self.entries.get(target).map(String::as_str)
    }

    pub fn contains(&self, target: &str) -> bool {
        self.entries.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<(String, String)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Builds the per-entry template context: `cycle`, `lead_time`, `mem` (for
/// ensemble members) and the configured default layers, later layers
/// overriding earlier ones.
#[derive(Debug, Clone)]
pub struct ContextBuilder<'a> {
    cycle: DateTime<Utc>,
    layers: Vec<&'a BTreeMap<String, Template>>,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(cycle: DateTime<Utc>) -> Self {
        Self {
            cycle,
            layers: Vec::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: &'a BTreeMap<String, Template>) -> Self {
        if !defaults.is_empty() {
            self.layers.push(defaults);
        }
        self
    }

    pub fn build(&self, lead_time: TimeDelta, member: Member) -> Result<Context, TemplateError> {
        let mut context = Context::new()
            .with("cycle", Value::Time(self.cycle))
            .with("lead_time", Value::Span(lead_time));
        if let Member::Ensemble(id) = member {
            context.insert("mem", Value::Int(i64::from(id)));
        }
        for layer in &self.layers {
            context.bind_defaults(layer)?;
        }
        Ok(context)
    }
}

/// Joins a base location and a file name without assuming the base is a
/// filesystem path; it may be a URL.
pub(crate) fn join_location(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}/{name}")
    }
}

/// Lazily yields one [`Manifest`] per configured location, in configuration
/// order. Each manifest covers every member, lead time and file template.
/// Clone it before iterating to replay the same sequence.
#[derive(Debug, Clone)]
pub struct Combinations<'a> {
    locations: &'a [Location],
    templates: &'a [Template],
    lead_times: &'a [TimeDelta],
    members: &'a [Member],
    context: ContextBuilder<'a>,
    next: usize,
}

impl<'a> Combinations<'a> {
    pub fn new(
        locations: &'a [Location],
        templates: &'a [Template],
        lead_times: &'a [TimeDelta],
        members: &'a [Member],
        context: ContextBuilder<'a>,
    ) -> Self {
        Self {
            locations,
            templates,
            lead_times,
            members,
            context,
            next: 0,
        }
    }

    fn manifest_for(&self, location: &Location) -> Result<Manifest, RetrieveError> {
        if let Location::Group(bases) = location {
            if bases.len() != self.templates.len() {
                return Err(RetrieveError::LocationTemplateMismatch {
                    locations: bases.len(),
                    templates: self.templates.len(),
                });
            }
        }

        let mut manifest = Manifest::new();
        for member in self.members {
            let prefix = member.prefix();
            for lead_time in self.lead_times {
                let context = self.context.build(*lead_time, *member)?;
                let pairs: Vec<(&Template, &Template)> = match location {
                    Location::Single(base) => self.templates.iter().map(|t| (base, t)).collect(),
                    Location::Group(bases) => bases.iter().zip(self.templates).collect(),
                };
                for (base, template) in pairs {
                    let base = base.render(&context)?;
                    let name = template.render(&context)?;
                    manifest.insert(format!("{prefix}{name}"), join_location(&base, &name));
                }
            }
        }
        Ok(manifest)
    }
}

impl Iterator for Combinations<'_> {
    type Item = Result<Manifest, RetrieveError>;

    fn next(&mut self) -> Option<Self::Item> {
        let location = self.locations.get(self.next)?;
        self.next += 1;
        Some(self.manifest_for(location))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.locations.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;

    fn templates(sources: &[&str]) -> Vec<Template> {
        sources.iter().map(|s| Template::parse(s).unwrap()).collect()
    }

    #[test]
    fn grouped_locations_pair_with_templates() {
        let locations = vec![Location::Group(templates(&["/a", "/b/"]))];
        let names = templates(&["x.{{ lead_time.hours }}", "y"]);
        let leads = [TimeDelta::hours(3)];
        let members = [Member::Deterministic];
        let cycle = Utc.with_ymd_and_hms(2025, 5, 4, 0, 0, 0).unwrap();
        let mut combos = Combinations::new(
            &locations,
            &names,
            &leads,
            &members,
            ContextBuilder::new(cycle),
        );

        let manifest = combos.next().unwrap().unwrap();
        assert_eq!(manifest.get("x.3"), Some("/a/x.3"));
        assert_eq!(manifest.get("y"), Some("/b/y"));
        assert!(combos.next().is_none());
    }

    #[test]
    fn grouped_location_length_mismatch() {
        let locations = vec![Location::Group(templates(&["/a", "/b"]))];
        let names = templates(&["x"]);
        let leads = [TimeDelta::zero()];
        let members = [Member::Deterministic];
        let cycle = Utc.with_ymd_and_hms(2025, 5, 4, 0, 0, 0).unwrap();
        let mut combos = Combinations::new(
            &locations,
            &names,
            &leads,
            &members,
            ContextBuilder::new(cycle),
        );
        assert_matches!(
            combos.next(),
            Some(Err(RetrieveError::LocationTemplateMismatch { locations: 2, templates: 1 }))
        );
    }

    #[test]
    fn join_handles_trailing_slash_and_empty_base() {
        assert_eq!(join_location("https://host/dir/", "f"), "https://host/dir/f");
        assert_eq!(join_location("", "f"), "f");
    }
}
