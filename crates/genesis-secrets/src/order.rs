//! X.509 signing-dependency resolution.
//!
//! Works over an arena of plans keyed by path plus a `signer → signed`
//! index; plans never hold pointers to each other. The output order
//! guarantees a CA is always emitted strictly before any plan it signs.

use crate::plan::{ErrorPlan, SecretPlan, SelfSigned, X509Plan};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

const ERR_AMBIGUOUS: &str = "Ambiguous or missing signing CA";
const ERR_CYCLE: &str = "Cyclical CA signage detected";
const ERR_UNREACHED: &str = "Could not find associated signing CA";

/// Order a parsed plan map into the emission sequence: X.509 plans in
/// signing-dependency order, then the remaining types in sorted path
/// order, with ordering failures demoted to error plans at the end.
pub fn order(plans: BTreeMap<String, SecretPlan>, root_ca_path: Option<&str>) -> Vec<SecretPlan> {
    let mut x509: BTreeMap<String, X509Plan> = BTreeMap::new();
    let mut others: Vec<SecretPlan> = Vec::new();

    for (path, plan) in plans {
        match plan {
            SecretPlan::X509(p) => {
                x509.insert(path, p);
            }
            other => others.push(other),
        }
    }

    // Classification: a path ending in /ca is a CA even without the flag.
    for (path, plan) in x509.iter_mut() {
        if path.ends_with("/ca") {
            plan.is_ca = true;
        }
    }

    let mut failures: BTreeMap<String, &'static str> = BTreeMap::new();

    elect_group_signers(&mut x509, &mut failures);
    apply_signing_defaults(&mut x509, root_ca_path, &failures);

    // signer -> [signed]; the empty signer holds self-signed and
    // root-signed plans.
    let mut index: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (path, plan) in &x509 {
        if failures.contains_key(path) {
            continue;
        }
        let signer = if plan.self_signed.is_self_signed()
            || plan.signed_by_abs_path
            || plan.signed_by.is_empty()
        {
            String::new()
        } else {
            plan.signed_by.clone()
        };
        index.entry(signer).or_default().push(path.clone());
    }

    let mut emitted: Vec<String> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for root in index.get("").cloned().unwrap_or_default() {
        emit(&root, &index, &mut seen, &mut emitted);
    }

    // Anything not reached from a root either sits in a signing cycle or
    // references a signer that never materialized.
    for path in x509.keys() {
        if seen.contains(path) || failures.contains_key(path) {
            continue;
        }
        let message = if in_cycle(path, &x509) {
            ERR_CYCLE
        } else {
            ERR_UNREACHED
        };
        debug!("plan {} not orderable: {}", path, message);
        failures.insert(path.clone(), message);
    }

    let mut out: Vec<SecretPlan> = Vec::with_capacity(x509.len() + others.len());
    for path in &emitted {
        out.push(SecretPlan::X509(x509[path].clone()));
    }
    out.extend(others);
    for (path, error) in failures {
        out.push(SecretPlan::Error(ErrorPlan {
            path,
            error: error.to_string(),
        }));
    }
    out
}

/// Per-base-path signer election.
fn elect_group_signers(
    x509: &mut BTreeMap<String, X509Plan>,
    failures: &mut BTreeMap<String, &'static str>,
) {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (path, plan) in x509.iter() {
        groups
            .entry(plan.base_path.clone())
            .or_default()
            .push(path.clone());
    }

    for (base_path, members) in groups {
        let cas: Vec<String> = members
            .iter()
            .filter(|m| x509[*m].is_ca)
            .cloned()
            .collect();

        let signer = match cas.len() {
            0 => continue,
            1 => cas[0].clone(),
            _ => {
                let canonical = format!("{}/ca", base_path);
                if cas.contains(&canonical) {
                    canonical
                } else {
                    // No way to pick a signer; the unsigned leaves are the
                    // plans affected.
                    for member in &members {
                        let plan = &x509[member];
                        if !plan.is_ca && plan.signed_by.is_empty() {
                            failures.insert(member.clone(), ERR_AMBIGUOUS);
                        }
                    }
                    continue;
                }
            }
        };

        for member in &members {
            let plan = x509.get_mut(member).unwrap();
            if member != &signer && !plan.is_ca && plan.signed_by.is_empty() {
                plan.signed_by = signer.clone();
            }
        }
    }
}

/// Root-CA fallback, implicit self-signing, and explicit self-signing.
fn apply_signing_defaults(
    x509: &mut BTreeMap<String, X509Plan>,
    root_ca_path: Option<&str>,
    failures: &BTreeMap<String, &'static str>,
) {
    for (path, plan) in x509.iter_mut() {
        if failures.contains_key(path) {
            continue;
        }
        if plan.signed_by == *path {
            plan.self_signed = SelfSigned::Explicit;
            plan.is_ca = true;
        } else if plan.signed_by.is_empty() {
            match root_ca_path {
                Some(root) => {
                    plan.signed_by = root.to_string();
                    plan.signed_by_abs_path = true;
                }
                None => plan.self_signed = SelfSigned::Implicit,
            }
        }
    }
}

fn emit(
    path: &str,
    index: &BTreeMap<String, Vec<String>>,
    seen: &mut BTreeSet<String>,
    out: &mut Vec<String>,
) {
    if !seen.insert(path.to_string()) {
        return;
    }
    out.push(path.to_string());
    if let Some(children) = index.get(path) {
        for child in children {
            if child != path {
                emit(child, index, seen, out);
            }
        }
    }
}

/// Whether `path` itself sits on a signing cycle.
fn in_cycle(path: &str, x509: &BTreeMap<String, X509Plan>) -> bool {
    let mut walked: Vec<&str> = vec![path];
    let mut current = x509[path].signed_by.as_str();

    loop {
        let Some(next) = x509.get(current) else {
            return false;
        };
        if let Some(pos) = walked.iter().position(|w| *w == current) {
            return pos == 0;
        }
        walked.push(current);
        if next.signed_by_abs_path || next.signed_by.is_empty() {
            return false;
        }
        current = next.signed_by.as_str();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x509_plan(path: &str, base: &str, is_ca: bool, signed_by: &str) -> SecretPlan {
        SecretPlan::X509(X509Plan {
            path: path.to_string(),
            base_path: base.to_string(),
            is_ca,
            signed_by: signed_by.to_string(),
            signed_by_abs_path: false,
            self_signed: SelfSigned::No,
            names: Vec::new(),
            usage: None,
            valid_for: None,
        })
    }

    fn plan_map(plans: Vec<SecretPlan>) -> BTreeMap<String, SecretPlan> {
        plans
            .into_iter()
            .map(|p| (p.path().to_string(), p))
            .collect()
    }

    fn paths(plans: &[SecretPlan]) -> Vec<&str> {
        plans.iter().map(|p| p.path()).collect()
    }

    #[test]
    fn test_single_ca_signs_group() {
        let ordered = order(
            plan_map(vec![
                x509_plan("tls/server", "tls", false, ""),
                x509_plan("tls/ca", "tls", true, ""),
                x509_plan("tls/client", "tls", false, ""),
            ]),
            None,
        );

        assert_eq!(paths(&ordered), vec!["tls/ca", "tls/client", "tls/server"]);

        let SecretPlan::X509(server) = &ordered[2] else { panic!() };
        assert_eq!(server.signed_by, "tls/ca");
        assert_eq!(server.self_signed, SelfSigned::No);

        // the CA itself got no signer, so it self-signs implicitly
        let SecretPlan::X509(ca) = &ordered[0] else { panic!() };
        assert_eq!(ca.self_signed, SelfSigned::Implicit);
    }

    #[test]
    fn test_signer_always_precedes_signed() {
        let ordered = order(
            plan_map(vec![
                x509_plan("pki/leaf", "pki", false, "pki/intermediate"),
                x509_plan("pki/intermediate", "pki", true, "pki/root"),
                x509_plan("pki/root", "pki", true, ""),
            ]),
            None,
        );

        let p = paths(&ordered);
        let pos = |path: &str| p.iter().position(|x| *x == path).unwrap();
        assert!(pos("pki/root") < pos("pki/intermediate"));
        assert!(pos("pki/intermediate") < pos("pki/leaf"));
    }

    #[test]
    fn test_ca_path_suffix_classifies() {
        let ordered = order(
            plan_map(vec![
                x509_plan("tls/ca", "tls", false, ""),
                x509_plan("tls/server", "tls", false, ""),
            ]),
            None,
        );

        let SecretPlan::X509(ca) = &ordered[0] else { panic!() };
        assert!(ca.is_ca);
        let SecretPlan::X509(server) = &ordered[1] else { panic!() };
        assert_eq!(server.signed_by, "tls/ca");
    }

    #[test]
    fn test_canonical_ca_wins_among_many() {
        let ordered = order(
            plan_map(vec![
                x509_plan("tls/ca", "tls", true, ""),
                x509_plan("tls/other-ca", "tls", true, ""),
                x509_plan("tls/server", "tls", false, ""),
            ]),
            None,
        );

        let SecretPlan::X509(server) = ordered
            .iter()
            .find(|p| p.path() == "tls/server")
            .unwrap()
            .clone()
        else {
            panic!()
        };
        assert_eq!(server.signed_by, "tls/ca");
    }

    #[test]
    fn test_ambiguous_cas_error() {
        let ordered = order(
            plan_map(vec![
                x509_plan("tls/east-ca", "tls", true, ""),
                x509_plan("tls/west-ca", "tls", true, ""),
                x509_plan("tls/server", "tls", false, ""),
            ]),
            None,
        );

        let SecretPlan::Error(err) = ordered
            .iter()
            .find(|p| p.path() == "tls/server")
            .unwrap()
        else {
            panic!("expected error plan for tls/server")
        };
        assert_eq!(err.error, "Ambiguous or missing signing CA");
    }

    #[test]
    fn test_root_ca_path_fallback() {
        let ordered = order(
            plan_map(vec![x509_plan("tls/ca", "tls", true, "")]),
            Some("secret/global/ca"),
        );

        let SecretPlan::X509(ca) = &ordered[0] else { panic!() };
        assert_eq!(ca.signed_by, "secret/global/ca");
        assert!(ca.signed_by_abs_path);
        assert_eq!(ca.self_signed, SelfSigned::No);
    }

    #[test]
    fn test_explicit_self_signing() {
        let ordered = order(
            plan_map(vec![
                x509_plan("tls/ca", "tls", false, "tls/ca"),
                x509_plan("tls/server", "tls", false, ""),
            ]),
            None,
        );

        assert_eq!(paths(&ordered), vec!["tls/ca", "tls/server"]);
        let SecretPlan::X509(ca) = &ordered[0] else { panic!() };
        assert_eq!(ca.self_signed, SelfSigned::Explicit);
        assert!(ca.is_ca);
    }

    #[test]
    fn test_cycle_detection() {
        let ordered = order(
            plan_map(vec![
                x509_plan("a/ca", "a", true, "b/ca"),
                x509_plan("b/ca", "b", true, "a/ca"),
            ]),
            None,
        );

        assert_eq!(ordered.len(), 2);
        for plan in &ordered {
            let SecretPlan::Error(err) = plan else {
                panic!("expected both plans to error")
            };
            assert_eq!(err.error, "Cyclical CA signage detected");
        }
    }

    #[test]
    fn test_missing_signer_appended_last() {
        let ordered = order(
            plan_map(vec![
                x509_plan("tls/ca", "tls", true, ""),
                x509_plan("other/server", "other", false, "nonexistent/ca"),
            ]),
            None,
        );

        assert_eq!(ordered.last().unwrap().path(), "other/server");
        let SecretPlan::Error(err) = ordered.last().unwrap() else {
            panic!()
        };
        assert_eq!(err.error, "Could not find associated signing CA");
    }

    #[test]
    fn test_plan_hanging_off_cycle_reports_missing_signer() {
        let ordered = order(
            plan_map(vec![
                x509_plan("a/ca", "a", true, "b/ca"),
                x509_plan("b/ca", "b", true, "a/ca"),
                x509_plan("c/leaf", "c", false, "a/ca"),
            ]),
            None,
        );

        let errors: BTreeMap<&str, &str> = ordered
            .iter()
            .map(|p| match p {
                SecretPlan::Error(e) => (e.path.as_str(), e.error.as_str()),
                _ => panic!("expected only error plans"),
            })
            .collect();

        assert_eq!(errors["a/ca"], "Cyclical CA signage detected");
        assert_eq!(errors["b/ca"], "Cyclical CA signage detected");
        assert_eq!(errors["c/leaf"], "Could not find associated signing CA");
    }
}
