//! CSS Cascade Engine
//!
//! Accumulates style rules and custom-property pools from one or more style
//! fragments, then resolves `var(--name)` references in [`StyleSheet::finalize`].
//!
//! Lookup chains:
//! - unscoped rule: own pool → `:root` pool; a hit becomes a static value.
//! - media-scoped rule: own media pool → own unscoped pool → `:root` pool; a
//!   hit only records the pool id, the runtime substitutes when the query
//!   matches.
//!
//! A reference that resolves nowhere is dropped with a warning. Selectors are
//! opaque keys.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::color::normalize_declaration;
use crate::css_parser::{parse_rules, RawRule};
use crate::error::CompilerWarning;

pub const ROOT_SELECTOR: &str = ":root";
const VARIABLE_SIGIL: &str = "--";

// ═══════════════════════════════════════════════════════════════════════════════
// RULE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PoolId(pub u32);

/// A property value of the exact shape `var(--name)` (a fallback argument is
/// kept in `value` but ignored for lookup).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableRef {
    pub value: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<PoolId>,
}

impl VariableRef {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let inner = value.strip_prefix("var(")?.strip_suffix(')')?;
        let name = inner.split(',').next()?.trim();
        if !name.starts_with(VARIABLE_SIGIL) {
            return None;
        }
        Some(Self {
            value: value.to_string(),
            name: name.to_string(),
            pool_id: None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySet {
    pub static_properties: BTreeMap<String, String>,
    pub variable_properties: BTreeMap<String, VariableRef>,
    /// Pool that satisfied each promoted static property.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub resolved_pools: BTreeMap<String, PoolId>,
}

impl PropertySet {
    /// Insert by value shape; a later write of the same name replaces the
    /// earlier one in whichever half it lived.
    pub fn insert(&mut self, name: &str, value: &str) {
        match VariableRef::parse(value) {
            Some(reference) => {
                self.static_properties.remove(name);
                self.variable_properties.insert(name.to_string(), reference);
            }
            None => {
                self.variable_properties.remove(name);
                self.static_properties
                    .insert(name.to_string(), value.to_string());
            }
        }
        self.resolved_pools.remove(name);
    }

    pub fn merge(&mut self, other: PropertySet) {
        for (name, value) in other.static_properties {
            self.variable_properties.remove(&name);
            self.static_properties.insert(name, value);
        }
        for (name, reference) in other.variable_properties {
            self.static_properties.remove(&name);
            self.variable_properties.insert(name, reference);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.static_properties.contains_key(name) || self.variable_properties.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.static_properties.is_empty() && self.variable_properties.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleRule {
    pub selector: String,
    /// Space-separated compounds, for the runtime's selector matcher.
    pub selector_list: Vec<String>,
    pub property_set: PropertySet,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub associated_media_queries: BTreeMap<String, u32>,
}

impl StyleRule {
    pub fn new(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            selector_list: selector.split_whitespace().map(str::to_string).collect(),
            property_set: PropertySet::default(),
            associated_media_queries: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.property_set.is_empty()
    }

    pub fn is_id_rule(&self) -> bool {
        self.selector_list.len() == 1 && self.selector_list[0].starts_with('#')
    }

    fn add_media_association(&mut self, media: &str) {
        *self
            .associated_media_queries
            .entry(media.to_string())
            .or_insert(0) += 1;
    }

    fn remove_media_association(&mut self, media: &str) {
        if let Some(count) = self.associated_media_queries.get_mut(media) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.associated_media_queries.remove(media);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablePool {
    pub pool_id: PoolId,
    pub variables: BTreeMap<String, String>,
}

fn lookup<'a>(name: &str, chain: &[Option<&'a VariablePool>]) -> Option<(PoolId, &'a str)> {
    chain
        .iter()
        .flatten()
        .find_map(|pool| pool.variables.get(name).map(|v| (pool.pool_id, v.as_str())))
}

// ═══════════════════════════════════════════════════════════════════════════════
// STYLESHEET
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleSheet {
    pub style_rules: BTreeMap<String, StyleRule>,
    /// media query → selector → rule
    pub media_style_rules: BTreeMap<String, BTreeMap<String, StyleRule>>,
    pub variable_pools: BTreeMap<String, VariablePool>,
    /// media query → selector → pool
    pub media_variable_pools: BTreeMap<String, BTreeMap<String, VariablePool>>,
    pub id_rules: BTreeMap<String, StyleRule>,
    #[serde(skip)]
    next_pool_id: u32,
}

impl StyleSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate one style fragment. May be called repeatedly before
    /// [`finalize`](Self::finalize).
    pub fn parse(&mut self, css: &str) {
        for rule in parse_rules(css) {
            self.add_rule(rule);
        }
    }

    pub fn style_rule(&self, selector: &str) -> Option<&StyleRule> {
        self.style_rules.get(selector)
    }

    pub fn media_style_rule(&self, media: &str, selector: &str) -> Option<&StyleRule> {
        self.media_style_rules.get(media)?.get(selector)
    }

    pub fn id_rule(&self, selector: &str) -> Option<&StyleRule> {
        self.id_rules.get(selector)
    }

    pub fn variable_pool(&self, selector: &str) -> Option<&VariablePool> {
        self.variable_pools.get(selector)
    }

    pub fn media_variable_pool(&self, media: &str, selector: &str) -> Option<&VariablePool> {
        self.media_variable_pools.get(media)?.get(selector)
    }

    pub fn is_empty(&self) -> bool {
        self.style_rules.is_empty()
            && self.media_style_rules.is_empty()
            && self.variable_pools.is_empty()
            && self.media_variable_pools.is_empty()
            && self.id_rules.is_empty()
    }

    fn add_rule(&mut self, rule: RawRule) {
        let mut variables = BTreeMap::new();
        let mut properties = Vec::new();
        for decl in rule.declarations {
            if decl.name.starts_with(VARIABLE_SIGIL) {
                variables.insert(decl.name, decl.value);
            } else {
                properties.push((decl.name, decl.value));
            }
        }

        let media = rule.media.as_deref();
        if !variables.is_empty() {
            self.append_pool(&rule.selector, media, &variables);
        }
        if properties.is_empty() {
            return;
        }

        let mut set = PropertySet::default();
        for (name, value) in properties {
            // same-rule substitution only sees this rule's own declarations
            let value = match VariableRef::parse(&value) {
                Some(reference) => variables.get(&reference.name).cloned().unwrap_or(value),
                None => value,
            };
            set.insert(&name, &normalize_declaration(&name, &value));
        }
        self.append_rule(&rule.selector, media, set);
    }

    fn append_pool(
        &mut self,
        selector: &str,
        media: Option<&str>,
        variables: &BTreeMap<String, String>,
    ) {
        let next_pool_id = &mut self.next_pool_id;
        let pools = match media {
            Some(query) => self
                .media_variable_pools
                .entry(query.to_string())
                .or_default(),
            None => &mut self.variable_pools,
        };
        let pool = pools.entry(selector.to_string()).or_insert_with(|| {
            let pool_id = PoolId(*next_pool_id);
            *next_pool_id += 1;
            VariablePool {
                pool_id,
                variables: BTreeMap::new(),
            }
        });
        pool.variables
            .extend(variables.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    fn append_rule(&mut self, selector: &str, media: Option<&str>, set: PropertySet) {
        let Some(query) = media else {
            self.style_rules
                .entry(selector.to_string())
                .or_insert_with(|| StyleRule::new(selector))
                .property_set
                .merge(set);
            return;
        };

        let rules = self.media_style_rules.entry(query.to_string()).or_default();
        match rules.get_mut(selector) {
            Some(rule) => rule.property_set.merge(set),
            None => {
                let mut rule = StyleRule::new(selector);
                rule.property_set = set;
                rules.insert(selector.to_string(), rule);
                self.register_media_placeholder(selector, query);
            }
        }
    }

    fn register_media_placeholder(&mut self, selector: &str, media: &str) {
        self.style_rules
            .entry(selector.to_string())
            .or_insert_with(|| StyleRule::new(selector))
            .add_media_association(media);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // FINALIZE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Resolve variables, prune empty rules and move id rules to their own
    /// bucket. Returns (and logs) one warning per dropped property.
    pub fn finalize(&mut self) -> Vec<CompilerWarning> {
        let mut warnings = Vec::new();

        self.project_media_variables();
        self.resolve_variables(&mut warnings);
        self.prune_empty_rules();
        self.extract_id_rules();

        for warning in &warnings {
            warning.emit();
        }
        warnings
    }

    /// An unscoped reference to a name that a media block redeclares for the
    /// same selector also applies inside that media query, so it gets a
    /// media-scoped copy. Properties the media rule already declares win.
    fn project_media_variables(&mut self) {
        let mut projections = Vec::new();
        for (selector, rule) in &self.style_rules {
            for (property, reference) in &rule.property_set.variable_properties {
                for (media, pools) in &self.media_variable_pools {
                    let redeclared = pools
                        .get(selector)
                        .is_some_and(|pool| pool.variables.contains_key(&reference.name));
                    if redeclared {
                        projections.push((
                            media.clone(),
                            selector.clone(),
                            property.clone(),
                            reference.clone(),
                        ));
                    }
                }
            }
        }

        for (media, selector, property, reference) in projections {
            let rules = self.media_style_rules.entry(media.clone()).or_default();
            let created = !rules.contains_key(&selector);
            let rule = rules
                .entry(selector.clone())
                .or_insert_with(|| StyleRule::new(&selector));
            if !rule.property_set.contains(&property) {
                rule.property_set
                    .variable_properties
                    .insert(property, reference);
            }
            if created {
                self.register_media_placeholder(&selector, &media);
            }
        }
    }

    fn resolve_variables(&mut self, warnings: &mut Vec<CompilerWarning>) {
        let root = self.variable_pools.get(ROOT_SELECTOR);

        for (selector, rule) in self.style_rules.iter_mut() {
            let chain = [self.variable_pools.get(selector), root];
            let references = std::mem::take(&mut rule.property_set.variable_properties);
            for (property, reference) in references {
                match lookup(&reference.name, &chain) {
                    Some((pool_id, value)) => {
                        rule.property_set
                            .static_properties
                            .insert(property.clone(), normalize_declaration(&property, value));
                        rule.property_set.resolved_pools.insert(property, pool_id);
                    }
                    None => warnings.push(CompilerWarning::UndefinedVariable {
                        selector: selector.clone(),
                        media: None,
                        property,
                        variable: reference.name,
                    }),
                }
            }
        }

        for (media, rules) in self.media_style_rules.iter_mut() {
            let media_pools = self.media_variable_pools.get(media);
            for (selector, rule) in rules.iter_mut() {
                let chain = [
                    media_pools.and_then(|pools| pools.get(selector)),
                    self.variable_pools.get(selector),
                    root,
                ];
                rule.property_set
                    .variable_properties
                    .retain(|property, reference| match lookup(&reference.name, &chain) {
                        Some((pool_id, _)) => {
                            reference.pool_id = Some(pool_id);
                            true
                        }
                        None => {
                            warnings.push(CompilerWarning::UndefinedVariable {
                                selector: selector.clone(),
                                media: Some(media.clone()),
                                property: property.clone(),
                                variable: reference.name.clone(),
                            });
                            false
                        }
                    });
            }
        }
    }

    fn prune_empty_rules(&mut self) {
        let mut released = Vec::new();
        for (media, rules) in self.media_style_rules.iter_mut() {
            rules.retain(|selector, rule| {
                if rule.is_empty() {
                    released.push((media.clone(), selector.clone()));
                    false
                } else {
                    true
                }
            });
        }
        self.media_style_rules.retain(|_, rules| !rules.is_empty());

        for (media, selector) in released {
            if let Some(rule) = self.style_rules.get_mut(&selector) {
                rule.remove_media_association(&media);
            }
        }

        self.style_rules
            .retain(|_, rule| !rule.is_empty() || !rule.associated_media_queries.is_empty());
    }

    fn extract_id_rules(&mut self) {
        let ids: Vec<String> = self
            .style_rules
            .iter()
            .filter(|(_, rule)| rule.is_id_rule())
            .map(|(selector, _)| selector.clone())
            .collect();
        for selector in ids {
            if let Some(rule) = self.style_rules.remove(&selector) {
                self.id_rules.insert(selector, rule);
            }
        }
    }
}
