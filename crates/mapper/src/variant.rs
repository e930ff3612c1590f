//! Variant resolution for mutually exclusive blocks.
//!
//! This is the only place that scans a group of optional blocks to decide which one is in use.

use corral_core::{EngineError, EngineResult, Record};
use corral_schema::VariantGroup;
use smallvec::SmallVec;

/// Block names of `group` carrying a non-empty list in `rec`, in declared order.
pub fn populated(rec: &Record, group: &VariantGroup) -> SmallVec<[&'static str; 4]> {
    group.blocks.iter().copied().filter(|b| rec.is_set(b)).collect()
}

/// Record direction: at most one block may be populated, exactly one for required groups.
pub fn resolve_record(rec: &Record, group: &VariantGroup) -> EngineResult<Option<&'static str>> {
    let found = populated(rec, group);
    match found.as_slice() {
        [] if group.required => Err(EngineError::validation(format!(
            "{}: one of {} is required",
            group.name,
            group.blocks.join(", ")
        ))),
        [] => Ok(None),
        [one] => Ok(Some(*one)),
        many => Err(EngineError::AmbiguousVariant {
            group: group.name.to_string(),
            populated: many.iter().map(|s| s.to_string()).collect(),
        }),
    }
}

/// Remote direction: exactly one candidate must be present.
pub fn resolve_remote<V>(group: &VariantGroup, candidates: impl IntoIterator<Item = (&'static str, Option<V>)>) -> EngineResult<(&'static str, V)> {
    resolve_remote_opt(group, candidates)?.ok_or_else(|| EngineError::NoVariantPopulated { group: group.name.to_string() })
}

/// Remote direction for groups where "none" is a legitimate answer.
pub fn resolve_remote_opt<V>(
    group: &VariantGroup,
    candidates: impl IntoIterator<Item = (&'static str, Option<V>)>,
) -> EngineResult<Option<(&'static str, V)>> {
    let mut hit: Option<(&'static str, V)> = None;
    let mut names: SmallVec<[&'static str; 4]> = SmallVec::new();
    for (name, payload) in candidates {
        if let Some(p) = payload {
            names.push(name);
            if hit.is_none() {
                hit = Some((name, p));
            }
        }
    }
    if names.len() > 1 {
        return Err(EngineError::MultipleVariantsPopulated {
            group: group.name.to_string(),
            populated: names.iter().map(|s| s.to_string()).collect(),
        });
    }
    Ok(hit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_schema::{ALERT_RULE, NETWORK_PLUGIN};

    fn block() -> Vec<Record> { vec![Record::new().with("iface", "eth0")] }

    #[test]
    fn record_with_two_blocks_is_ambiguous() {
        let rec = Record::new()
            .with("canal_network_provider", block())
            .with("flannel_network_provider", block())
            .with("calico_network_provider", Vec::<Record>::new());
        match resolve_record(&rec, &NETWORK_PLUGIN).unwrap_err() {
            EngineError::AmbiguousVariant { group, populated } => {
                assert_eq!(group, "network_plugin");
                assert_eq!(populated, vec!["canal_network_provider", "flannel_network_provider"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn optional_group_may_be_empty_required_may_not() {
        assert_eq!(resolve_record(&Record::new(), &NETWORK_PLUGIN).unwrap(), None);
        assert!(matches!(resolve_record(&Record::new(), &ALERT_RULE), Err(EngineError::Validation(_))));
        let rec = Record::new().with("node_rule", vec![Record::new()]);
        assert_eq!(resolve_record(&rec, &ALERT_RULE).unwrap(), Some("node_rule"));
    }

    #[test]
    fn remote_resolution_never_picks_silently() {
        let none: [(&'static str, Option<u8>); 2] = [("a", None), ("b", None)];
        assert!(matches!(resolve_remote(&NETWORK_PLUGIN, none), Err(EngineError::NoVariantPopulated { .. })));

        let two = [("a", Some(1u8)), ("b", Some(2u8))];
        match resolve_remote(&NETWORK_PLUGIN, two).unwrap_err() {
            EngineError::MultipleVariantsPopulated { populated, .. } => assert_eq!(populated, vec!["a", "b"]),
            other => panic!("unexpected {other:?}"),
        }

        let one = [("a", None), ("b", Some(2u8))];
        assert_eq!(resolve_remote(&NETWORK_PLUGIN, one).unwrap(), ("b", 2));
    }
}
