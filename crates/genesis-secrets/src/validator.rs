//! Deep validation of materialized secrets.
//!
//! The validator pre-loads a store export and then performs structural,
//! cryptographic, and policy-level checks per plan type: certificate /
//! key coherence, subject names, signing chains, validity windows, key
//! usage, keypair derivation, random-string length and charset.

use crate::executor::{ItemResult, ProgressEvent, ProgressSink, Summary};
use crate::plan::{KeyPlan, RandomPlan, SecretPlan, X509Plan};
use genesis_services::vault::StoreExport;
use genesis_services::Vault;
use genesis_types::{CheckStatus, Result, SecretAction};
use openssl::asn1::Asn1Time;
use openssl::dh::Dh;
use openssl::nid::Nid;
use openssl::rsa::Rsa;
use openssl::x509::{X509, X509Ref};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// Days of remaining validity below which a certificate is flagged.
const EXPIRY_WARN_DAYS: i32 = 30;

/// openssl text names for key usage and extended key usage, mapped to
/// the tokens plans are written in.
const USAGE_TOKENS: &[(&str, &str)] = &[
    ("Digital Signature", "digital_signature"),
    ("Non Repudiation", "non_repudiation"),
    ("Content Commitment", "content_commitment"),
    ("Key Encipherment", "key_encipherment"),
    ("Data Encipherment", "data_encipherment"),
    ("Key Agreement", "key_agreement"),
    ("Certificate Sign", "key_cert_sign"),
    ("CRL Sign", "crl_sign"),
    ("Encipher Only", "encipher_only"),
    ("Decipher Only", "decipher_only"),
    ("TLS Web Server Authentication", "server_auth"),
    ("TLS Web Client Authentication", "client_auth"),
    ("Code Signing", "code_signing"),
    ("E-mail Protection", "email_protection"),
    ("Time Stamping", "timestamping"),
    ("OCSP Signing", "ocsp_signing"),
    ("Any Extended Key Usage", "any"),
];

/// `non_repudiation` and `content_commitment` are the same bit under two
/// names; either satisfies the other.
fn canonical_usage(token: &str) -> &str {
    if token == "content_commitment" {
        "non_repudiation"
    } else {
        token
    }
}

/// Validates plans against a pre-loaded store export.
pub struct Validator<'a> {
    vault: &'a Vault,
    base: String,
}

impl<'a> Validator<'a> {
    /// Create a validator whose plan paths hang off `base`.
    pub fn new(vault: &'a Vault, base: impl Into<String>) -> Self {
        let mut base = base.into();
        if !base.is_empty() && !base.ends_with('/') {
            base.push('/');
        }
        Self { vault, base }
    }

    /// Check (`SecretAction::Check`: expected keys exist) or validate
    /// (`SecretAction::Validate`: deep checks) every plan, reporting
    /// per-item progress through `sink`.
    pub fn validate(
        &self,
        plans: &[SecretPlan],
        level: SecretAction,
        sink: &mut dyn ProgressSink,
    ) -> Result<Summary> {
        sink.on_event(ProgressEvent::Wait {
            message: format!("retrieving secrets under {}", self.base),
        });
        let export = self.vault.export(&[self.base.trim_end_matches('/')])?;
        sink.on_event(ProgressEvent::WaitDone);

        let mut summary = Summary::default();
        sink.on_event(ProgressEvent::Init {
            action: level,
            total: plans.len(),
        });

        if plans.is_empty() {
            sink.on_event(ProgressEvent::Empty);
            return Ok(summary);
        }

        for (i, plan) in plans.iter().enumerate() {
            let index = i + 1;
            sink.on_event(ProgressEvent::StartItem {
                index,
                total: plans.len(),
                plan,
            });

            let result = self.check_item(plan, level, &export);
            summary.add(result.status);
            sink.on_event(ProgressEvent::DoneItem { index, result: &result });
        }

        sink.on_event(ProgressEvent::Completed { summary: &summary });
        Ok(summary)
    }

    fn full_path(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn check_item(&self, plan: &SecretPlan, level: SecretAction, export: &StoreExport) -> ItemResult {
        let label = plan.label();

        if let SecretPlan::Error(err) = plan {
            return ItemResult {
                label,
                status: CheckStatus::Error,
                message: err.error.clone(),
            };
        }

        let full = self.full_path(plan.path());
        let Some(stored) = export.get(&full) else {
            return ItemResult {
                label,
                status: CheckStatus::Missing,
                message: format!("no secret at {}", full),
            };
        };

        let absent: Vec<String> = plan
            .expected_keys()
            .into_iter()
            .filter(|k| !stored.contains_key(k))
            .collect();
        if !absent.is_empty() {
            return ItemResult {
                label,
                status: CheckStatus::Missing,
                message: format!("missing key(s): {}", absent.join(", ")),
            };
        }

        if level == SecretAction::Check {
            return ItemResult {
                label,
                status: CheckStatus::Ok,
                message: "exists".to_string(),
            };
        }

        let (status, message) = match plan {
            SecretPlan::X509(p) => self.validate_x509(p, stored, export),
            SecretPlan::Rsa(p) => validate_rsa(p, stored),
            SecretPlan::Ssh(p) => validate_ssh(p, stored),
            SecretPlan::Random(p) => validate_random(p, stored),
            SecretPlan::Dhparams(_) => validate_dhparams(stored),
            SecretPlan::Error(_) => unreachable!("handled above"),
        };

        ItemResult {
            label,
            status,
            message,
        }
    }

    fn validate_x509(
        &self,
        plan: &X509Plan,
        stored: &BTreeMap<String, String>,
        export: &StoreExport,
    ) -> (CheckStatus, String) {
        let mut issues: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut notes: Vec<String> = Vec::new();

        let cert = match X509::from_pem(stored["certificate"].as_bytes()) {
            Ok(cert) => cert,
            Err(e) => return (CheckStatus::Error, format!("unparseable certificate: {}", e)),
        };
        let key = match Rsa::private_key_from_pem(stored["key"].as_bytes()) {
            Ok(key) => key,
            Err(e) => return (CheckStatus::Error, format!("unparseable private key: {}", e)),
        };

        // private key belongs to this certificate
        match cert.public_key().and_then(|pk| pk.rsa()) {
            Ok(cert_rsa) => {
                if cert_rsa.n().to_vec() != key.n().to_vec() {
                    issues.push("private key does not match certificate modulus".to_string());
                }
            }
            Err(e) => issues.push(format!("certificate public key unreadable: {}", e)),
        }

        let text = cert
            .to_text()
            .map(|t| String::from_utf8_lossy(&t).to_string())
            .unwrap_or_default();

        check_subject(plan, &cert, &mut issues);
        check_sans(plan, &cert, &mut issues);

        // CA flag consistency
        let is_ca_actual = text.contains("CA:TRUE");
        if plan.is_ca && !is_ca_actual {
            issues.push("expected a CA but certificate has no CA basic constraint".to_string());
        } else if !plan.is_ca && is_ca_actual {
            issues.push("certificate is a CA but the plan does not declare one".to_string());
        }

        check_validity(&cert, &mut issues, &mut warnings, &mut notes);
        check_usage(plan, &text, &mut issues);
        self.check_signer(plan, &cert, export, &mut issues);

        summarize(issues, warnings, notes)
    }

    /// Signer verification: Authority Key ID against the signer's
    /// Subject Key ID when both are present, direct signature
    /// verification otherwise, and the store's own `x509 validate` when
    /// the signer certificate is not in the export.
    fn check_signer(
        &self,
        plan: &X509Plan,
        cert: &X509Ref,
        export: &StoreExport,
        issues: &mut Vec<String>,
    ) {
        if plan.self_signed.is_self_signed() {
            let skid = cert.subject_key_id().map(|id| id.as_slice().to_vec());
            let akid = cert.authority_key_id().map(|id| id.as_slice().to_vec());
            match (skid, akid) {
                (Some(s), Some(a)) => {
                    if s != a {
                        issues.push(
                            "expected self-signed, but authority key id differs from \
                             subject key id"
                                .to_string(),
                        );
                    }
                }
                _ => {
                    let subject = name_cn(cert.subject_name());
                    let issuer = name_cn(cert.issuer_name());
                    if subject != issuer {
                        issues.push(format!(
                            "expected self-signed, but issuer CN '{}' differs from \
                             subject CN '{}'",
                            issuer.unwrap_or_default(),
                            subject.unwrap_or_default()
                        ));
                    }
                }
            }
            return;
        }

        if plan.signed_by.is_empty() {
            return;
        }

        let signer_path = if plan.signed_by_abs_path {
            plan.signed_by.clone()
        } else {
            self.full_path(&plan.signed_by)
        };

        let signer_pem = export
            .get(&signer_path)
            .and_then(|keys| keys.get("certificate"));

        let Some(signer_pem) = signer_pem else {
            // Signer lives outside the export (a root CA path); ask the
            // store itself to verify the chain.
            let full = self.full_path(&plan.path);
            match self.vault.query([
                "x509",
                "validate",
                "--signed-by",
                signer_path.as_str(),
                full.as_str(),
            ]) {
                Ok(out) if out.success() => {}
                Ok(out) => issues.push(format!(
                    "not signed by {}: {}",
                    signer_path,
                    out.combined().trim()
                )),
                Err(e) => issues.push(format!("could not verify signer: {}", e)),
            }
            return;
        };

        let signer = match X509::from_pem(signer_pem.as_bytes()) {
            Ok(signer) => signer,
            Err(e) => {
                issues.push(format!("signer certificate unparseable: {}", e));
                return;
            }
        };

        let akid = cert.authority_key_id().map(|id| id.as_slice().to_vec());
        let skid = signer.subject_key_id().map(|id| id.as_slice().to_vec());
        match (akid, skid) {
            (Some(a), Some(s)) => {
                if a != s {
                    issues.push(format!(
                        "authority key id does not match subject key id of signer {}",
                        plan.signed_by
                    ));
                }
            }
            _ => match signer.public_key() {
                Ok(signer_key) => match cert.verify(&signer_key) {
                    Ok(true) => {}
                    Ok(false) => issues.push(format!(
                        "certificate signature does not verify against {}",
                        plan.signed_by
                    )),
                    Err(e) => issues.push(format!("signature verification failed: {}", e)),
                },
                Err(e) => issues.push(format!("signer public key unreadable: {}", e)),
            },
        }
    }
}

fn name_cn(name: &openssl::x509::X509NameRef) -> Option<String> {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|e| e.data().as_utf8().ok())
        .map(|s| s.to_string())
}

fn check_subject(plan: &X509Plan, cert: &X509Ref, issues: &mut Vec<String>) {
    let cn = name_cn(cert.subject_name());

    match plan.cn() {
        Some(expected) => {
            if cn.as_deref() != Some(expected) {
                issues.push(format!(
                    "subject CN is '{}', expected '{}'",
                    cn.unwrap_or_default(),
                    expected
                ));
            }
        }
        None if plan.is_ca => {
            let pattern = format!(r"^ca\.n\d{{9}}\.{}$", regex::escape(&plan.base_path));
            let re = Regex::new(&pattern).expect("static CN pattern");
            if !cn.as_deref().map_or(false, |c| re.is_match(c)) {
                issues.push(format!(
                    "subject CN '{}' does not match the generated CA pattern for {}",
                    cn.unwrap_or_default(),
                    plan.base_path
                ));
            }
        }
        None => {}
    }
}

fn check_sans(plan: &X509Plan, cert: &X509Ref, issues: &mut Vec<String>) {
    let cn = name_cn(cert.subject_name());

    let mut actual: BTreeSet<String> = BTreeSet::new();
    if let Some(sans) = cert.subject_alt_names() {
        for san in sans.iter() {
            if let Some(dns) = san.dnsname() {
                actual.insert(dns.to_string());
            } else if let Some(ip) = san.ipaddress() {
                match ip.len() {
                    4 => {
                        let octets: [u8; 4] = ip.try_into().unwrap();
                        actual.insert(std::net::Ipv4Addr::from(octets).to_string());
                    }
                    16 => {
                        let octets: [u8; 16] = ip.try_into().unwrap();
                        actual.insert(std::net::Ipv6Addr::from(octets).to_string());
                    }
                    _ => {}
                }
            }
        }
    }
    // the CN is conventionally repeated in the SAN list; it is not an extra
    if let Some(cn) = cn {
        actual.remove(&cn);
    }

    let expected: BTreeSet<String> = plan.sans().iter().cloned().collect();

    let missing: Vec<&String> = expected.difference(&actual).collect();
    let extra: Vec<&String> = actual.difference(&expected).collect();

    if !missing.is_empty() {
        issues.push(format!(
            "missing subject alternative name(s): {}",
            missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        ));
    }
    if !extra.is_empty() {
        issues.push(format!(
            "unexpected subject alternative name(s): {}",
            extra.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        ));
    }
}

fn check_validity(
    cert: &X509Ref,
    issues: &mut Vec<String>,
    warnings: &mut Vec<String>,
    notes: &mut Vec<String>,
) {
    let Ok(now) = Asn1Time::days_from_now(0) else {
        issues.push("could not determine current time".to_string());
        return;
    };

    if let Ok(diff) = now.diff(cert.not_before()) {
        if diff.days > 0 || (diff.days == 0 && diff.secs > 0) {
            issues.push(format!("not valid for another {} day(s)", diff.days.max(1)));
        }
    }

    match now.diff(cert.not_after()) {
        Ok(diff) if diff.days < 0 || (diff.days == 0 && diff.secs < 0) => {
            issues.push(format!("expired {} day(s) ago", (-diff.days).max(1)));
        }
        Ok(diff) if diff.days <= EXPIRY_WARN_DAYS => {
            warnings.push(format!("expires in {} day(s)", diff.days));
        }
        Ok(diff) => {
            notes.push(format!("expires in {} days", diff.days));
        }
        Err(e) => issues.push(format!("could not compute expiry: {}", e)),
    }
}

fn check_usage(plan: &X509Plan, text: &str, issues: &mut Vec<String>) {
    let mut actual: BTreeSet<String> = BTreeSet::new();
    for header in ["X509v3 Key Usage", "X509v3 Extended Key Usage"] {
        let Some(pos) = text.find(header) else {
            continue;
        };
        let Some(line) = text[pos..].lines().nth(1) else {
            continue;
        };
        for item in line.trim().split(',') {
            let item = item.trim();
            if let Some((_, token)) = USAGE_TOKENS.iter().find(|(name, _)| *name == item) {
                actual.insert(canonical_usage(token).to_string());
            } else if !item.is_empty() {
                actual.insert(item.to_lowercase().replace(' ', "_"));
            }
        }
    }

    let expected: BTreeSet<String> = plan
        .key_usage()
        .iter()
        .map(|u| canonical_usage(u).to_string())
        .collect();

    let missing: Vec<&String> = expected.difference(&actual).collect();
    let extra: Vec<&String> = actual.difference(&expected).collect();

    if !missing.is_empty() {
        issues.push(format!(
            "missing key usage: {}",
            missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        ));
    }
    if !extra.is_empty() {
        issues.push(format!(
            "unexpected key usage: {}",
            extra.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        ));
    }
}

fn validate_rsa(plan: &KeyPlan, stored: &BTreeMap<String, String>) -> (CheckStatus, String) {
    let mut issues = Vec::new();

    let private = match Rsa::private_key_from_pem(stored["private"].as_bytes()) {
        Ok(key) => Some(key),
        Err(e) => {
            issues.push(format!("unparseable private key: {}", e));
            None
        }
    };

    let public = match openssl::pkey::PKey::public_key_from_pem(stored["public"].as_bytes())
        .and_then(|pk| pk.rsa())
    {
        Ok(key) => Some(key),
        Err(e) => {
            issues.push(format!("unparseable public key: {}", e));
            None
        }
    };

    if let (Some(private), Some(public)) = (&private, &public) {
        if private.n().to_vec() != public.n().to_vec() {
            issues.push("public key was not derived from the private key".to_string());
        }
    }

    if let Some(private) = &private {
        let bits = private.n().num_bits() as u32;
        if bits != plan.size {
            issues.push(format!("key is {} bits, expected {}", bits, plan.size));
        }
    }

    summarize(issues, Vec::new(), Vec::new())
}

fn validate_ssh(plan: &KeyPlan, stored: &BTreeMap<String, String>) -> (CheckStatus, String) {
    let mut issues = Vec::new();

    let private = match Rsa::private_key_from_pem(stored["private"].as_bytes()) {
        Ok(key) => Some(key),
        Err(e) => {
            issues.push(format!("unparseable private key: {}", e));
            None
        }
    };

    if let Some(private) = &private {
        let derived = ssh_public_key(private);
        let stored_blob = stored["public"].split_whitespace().nth(1).unwrap_or("");
        let derived_blob = derived.split_whitespace().nth(1).unwrap_or("-");
        if stored_blob != derived_blob {
            issues.push("stored public key does not match the private key".to_string());
        }

        let bits = private.n().num_bits() as u32;
        if bits != plan.size {
            issues.push(format!("key is {} bits, expected {}", bits, plan.size));
        }
    }

    summarize(issues, Vec::new(), Vec::new())
}

/// Rebuild the OpenSSH wire-format public key from an RSA private key.
fn ssh_public_key(key: &Rsa<openssl::pkey::Private>) -> String {
    use base64::Engine;

    fn push_block(out: &mut Vec<u8>, bytes: &[u8]) {
        out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(bytes);
    }

    fn push_mpint(out: &mut Vec<u8>, bytes: Vec<u8>) {
        let mut bytes = bytes;
        if bytes.first().map_or(false, |b| b & 0x80 != 0) {
            bytes.insert(0, 0);
        }
        push_block(out, &bytes);
    }

    let mut blob = Vec::new();
    push_block(&mut blob, b"ssh-rsa");
    push_mpint(&mut blob, key.e().to_vec());
    push_mpint(&mut blob, key.n().to_vec());

    format!(
        "ssh-rsa {}",
        base64::engine::general_purpose::STANDARD.encode(&blob)
    )
}

fn validate_random(plan: &RandomPlan, stored: &BTreeMap<String, String>) -> (CheckStatus, String) {
    let mut issues = Vec::new();
    let value = &stored[&plan.key];

    if value.chars().count() != plan.size {
        issues.push(format!(
            "value is {} characters, expected {}",
            value.chars().count(),
            plan.size
        ));
    }

    if let Some(chars) = &plan.valid_chars {
        match Regex::new(&format!("^[{}]+$", chars)) {
            Ok(re) => {
                if !re.is_match(value) {
                    issues.push(format!("value contains characters outside [{}]", chars));
                }
            }
            Err(e) => issues.push(format!("invalid character class [{}]: {}", chars, e)),
        }
    }

    // formatted companion presence is covered by the expected-key check;
    // nothing further can be asserted about one-way formats
    summarize(issues, Vec::new(), Vec::new())
}

fn validate_dhparams(stored: &BTreeMap<String, String>) -> (CheckStatus, String) {
    match Dh::params_from_pem(stored["dhparam-pem"].as_bytes()) {
        Ok(_) => (CheckStatus::Ok, "valid".to_string()),
        Err(e) => (
            CheckStatus::Error,
            format!("unparseable dhparam PEM: {}", e),
        ),
    }
}

fn summarize(
    issues: Vec<String>,
    warnings: Vec<String>,
    notes: Vec<String>,
) -> (CheckStatus, String) {
    if !issues.is_empty() {
        let mut all = issues;
        all.extend(warnings);
        (CheckStatus::Error, all.join("\n"))
    } else if !warnings.is_empty() {
        (CheckStatus::Warn, warnings.join("\n"))
    } else if notes.is_empty() {
        (CheckStatus::Ok, "valid".to_string())
    } else {
        (CheckStatus::Ok, format!("valid | {}", notes.join(" | ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::NullSink;
    use crate::plan::SelfSigned;
    use genesis_core::process::ScriptedRunner;
    use genesis_services::target::StoreTarget;
    use openssl::hash::MessageDigest;
    use openssl::pkey::{PKey, Private};
    use openssl::x509::extension::{
        AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage,
        SubjectAlternativeName, SubjectKeyIdentifier,
    };
    use openssl::x509::{X509Builder, X509NameBuilder};
    use std::sync::Arc;

    struct TestCert {
        key: PKey<Private>,
        cert: X509,
    }

    fn subject(cn: &str) -> openssl::x509::X509Name {
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", cn).unwrap();
        name.build()
    }

    fn build_ca(cn: &str) -> TestCert {
        let rsa = Rsa::generate(2048).unwrap();
        let key = PKey::from_rsa(rsa).unwrap();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let name = subject(cn);
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(3650).unwrap())
            .unwrap();

        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder
            .append_extension(
                KeyUsage::new().key_cert_sign().crl_sign().build().unwrap(),
            )
            .unwrap();
        let skid = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(None, None))
            .unwrap();
        builder.append_extension(skid).unwrap();

        builder.sign(&key, MessageDigest::sha256()).unwrap();
        TestCert {
            key,
            cert: builder.build(),
        }
    }

    fn build_signed(cn: &str, sans: &[&str], ca: &TestCert, days: u32) -> TestCert {
        let rsa = Rsa::generate(2048).unwrap();
        let key = PKey::from_rsa(rsa).unwrap();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        builder.set_subject_name(&subject(cn)).unwrap();
        builder
            .set_issuer_name(ca.cert.subject_name())
            .unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(days).unwrap())
            .unwrap();

        builder
            .append_extension(
                ExtendedKeyUsage::new()
                    .server_auth()
                    .client_auth()
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let mut san = SubjectAlternativeName::new();
        san.dns(cn);
        for entry in sans {
            san.dns(entry);
        }
        let san = san
            .build(&builder.x509v3_context(Some(&ca.cert), None))
            .unwrap();
        builder.append_extension(san).unwrap();

        let skid = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(Some(&ca.cert), None))
            .unwrap();
        builder.append_extension(skid).unwrap();
        let akid = AuthorityKeyIdentifier::new()
            .keyid(true)
            .build(&builder.x509v3_context(Some(&ca.cert), None))
            .unwrap();
        builder.append_extension(akid).unwrap();

        builder.sign(&ca.key, MessageDigest::sha256()).unwrap();
        TestCert {
            key,
            cert: builder.build(),
        }
    }

    fn pem(cert: &X509) -> String {
        String::from_utf8(cert.to_pem().unwrap()).unwrap()
    }

    fn key_pem(key: &PKey<Private>) -> String {
        String::from_utf8(key.rsa().unwrap().private_key_to_pem().unwrap()).unwrap()
    }

    fn x509_entry(tc: &TestCert, is_ca: bool) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("certificate".to_string(), pem(&tc.cert));
        map.insert("key".to_string(), key_pem(&tc.key));
        map.insert(
            "combined".to_string(),
            format!("{}{}", pem(&tc.cert), key_pem(&tc.key)),
        );
        if is_ca {
            map.insert("crl".to_string(), "-----BEGIN X509 CRL-----".to_string());
            map.insert("serial".to_string(), "02".to_string());
        }
        map
    }

    fn vault_with_export(export: &StoreExport) -> (Arc<ScriptedRunner>, Vault) {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_output(serde_json::to_string(export).unwrap(), 0);
        let vault = Vault::new(
            StoreTarget::new("lab", "https://vault.lab.example:8200", true).unwrap(),
            runner.clone(),
        );
        (runner, vault)
    }

    fn x509_plan(path: &str, is_ca: bool, signed_by: &str, names: Vec<String>) -> X509Plan {
        X509Plan {
            path: path.to_string(),
            base_path: "tls".to_string(),
            is_ca,
            signed_by: signed_by.to_string(),
            signed_by_abs_path: false,
            self_signed: if is_ca && signed_by.is_empty() {
                SelfSigned::Implicit
            } else {
                SelfSigned::No
            },
            names,
            usage: if is_ca {
                Some(vec!["key_cert_sign".to_string(), "crl_sign".to_string()])
            } else {
                None
            },
            valid_for: None,
        }
    }

    #[test]
    fn test_valid_chain_reports_ok() {
        let ca = build_ca("ca.n000000001.tls");
        let server = build_signed("api.example", &["alt.example"], &ca, 365);

        let mut export = StoreExport::new();
        export.insert("secret/lab/tls/ca".to_string(), x509_entry(&ca, true));
        export.insert("secret/lab/tls/server".to_string(), x509_entry(&server, false));

        let plans = vec![
            SecretPlan::X509(x509_plan("tls/ca", true, "", vec![])),
            SecretPlan::X509(x509_plan(
                "tls/server",
                false,
                "tls/ca",
                vec!["api.example".to_string(), "alt.example".to_string()],
            )),
        ];

        let (_, vault) = vault_with_export(&export);
        let validator = Validator::new(&vault, "secret/lab/");
        let summary = validator
            .validate(&plans, SecretAction::Validate, &mut NullSink)
            .unwrap();

        assert_eq!(summary.ok, 2, "expected both plans valid: {:?}", summary);
        assert_eq!(summary.error, 0);
    }

    #[test]
    fn test_cn_mismatch_and_san_extras() {
        let ca = build_ca("ca.n000000001.tls");
        let server = build_signed("wrong.example", &["extra.example"], &ca, 365);

        let mut export = StoreExport::new();
        export.insert("secret/lab/tls/ca".to_string(), x509_entry(&ca, true));
        export.insert("secret/lab/tls/server".to_string(), x509_entry(&server, false));

        let plan = SecretPlan::X509(x509_plan(
            "tls/server",
            false,
            "tls/ca",
            vec!["api.example".to_string(), "alt.example".to_string()],
        ));

        let (_, vault) = vault_with_export(&export);
        let validator = Validator::new(&vault, "secret/lab/");
        let export_loaded = vault.export(&["secret/lab"]).unwrap();
        let result = validator.check_item(&plan, SecretAction::Validate, &export_loaded);

        assert_eq!(result.status, CheckStatus::Error);
        assert!(result.message.contains("subject CN is 'wrong.example'"));
        assert!(result.message.contains("missing subject alternative name(s): alt.example"));
        assert!(result.message.contains("unexpected subject alternative name(s): extra.example"));
    }

    #[test]
    fn test_wrong_signer_detected() {
        let ca = build_ca("ca.n000000001.tls");
        let rogue = build_ca("ca.n000000002.tls");
        let server = build_signed("api.example", &[], &rogue, 365);

        let mut export = StoreExport::new();
        export.insert("secret/lab/tls/ca".to_string(), x509_entry(&ca, true));
        export.insert("secret/lab/tls/server".to_string(), x509_entry(&server, false));

        let plan = SecretPlan::X509(x509_plan(
            "tls/server",
            false,
            "tls/ca",
            vec!["api.example".to_string()],
        ));

        let (_, vault) = vault_with_export(&export);
        let validator = Validator::new(&vault, "secret/lab/");
        let export_loaded = vault.export(&["secret/lab"]).unwrap();
        let result = validator.check_item(&plan, SecretAction::Validate, &export_loaded);

        assert_eq!(result.status, CheckStatus::Error);
        assert!(result.message.contains("authority key id"));
    }

    #[test]
    fn test_expiring_certificate_warns() {
        let ca = build_ca("ca.n000000001.tls");
        // ten days of validity left: inside the warning window
        let server = build_signed("api.example", &[], &ca, 10);

        let mut export = StoreExport::new();
        export.insert("secret/lab/tls/ca".to_string(), x509_entry(&ca, true));
        export.insert("secret/lab/tls/server".to_string(), x509_entry(&server, false));

        let plan = SecretPlan::X509(x509_plan(
            "tls/server",
            false,
            "tls/ca",
            vec!["api.example".to_string()],
        ));

        let (_, vault) = vault_with_export(&export);
        let validator = Validator::new(&vault, "secret/lab/");
        let export_loaded = vault.export(&["secret/lab"]).unwrap();
        let result = validator.check_item(&plan, SecretAction::Validate, &export_loaded);

        assert_eq!(result.status, CheckStatus::Warn);
        assert!(result.message.contains("expires in"));
    }

    #[test]
    fn test_check_level_only_wants_keys() {
        let mut export = StoreExport::new();
        let mut entry = BTreeMap::new();
        entry.insert("private".to_string(), "not even pem".to_string());
        entry.insert("public".to_string(), "still not pem".to_string());
        export.insert("secret/lab/op/key".to_string(), entry);

        let plan = SecretPlan::Rsa(KeyPlan {
            path: "op/key".into(),
            size: 2048,
            fixed: false,
        });

        let (_, vault) = vault_with_export(&export);
        let validator = Validator::new(&vault, "secret/lab/");
        let export_loaded = vault.export(&["secret/lab"]).unwrap();

        let result = validator.check_item(&plan, SecretAction::Check, &export_loaded);
        assert_eq!(result.status, CheckStatus::Ok);

        let result = validator.check_item(&plan, SecretAction::Validate, &export_loaded);
        assert_eq!(result.status, CheckStatus::Error);
    }

    #[test]
    fn test_missing_keys_reported() {
        let mut export = StoreExport::new();
        let mut entry = BTreeMap::new();
        entry.insert("private".to_string(), "pem".to_string());
        export.insert("secret/lab/op/ssh".to_string(), entry);

        let plan = SecretPlan::Ssh(KeyPlan {
            path: "op/ssh".into(),
            size: 2048,
            fixed: false,
        });

        let (_, vault) = vault_with_export(&export);
        let validator = Validator::new(&vault, "secret/lab/");
        let export_loaded = vault.export(&["secret/lab"]).unwrap();
        let result = validator.check_item(&plan, SecretAction::Check, &export_loaded);

        assert_eq!(result.status, CheckStatus::Missing);
        assert!(result.message.contains("public"));
        assert!(result.message.contains("fingerprint"));
    }

    #[test]
    fn test_rsa_keypair_coherence() {
        let rsa = Rsa::generate(2048).unwrap();
        let private =
            String::from_utf8(rsa.private_key_to_pem().unwrap()).unwrap();
        let public = String::from_utf8(
            PKey::from_rsa(rsa).unwrap().public_key_to_pem().unwrap(),
        )
        .unwrap();

        let mut entry = BTreeMap::new();
        entry.insert("private".to_string(), private);
        entry.insert("public".to_string(), public);

        let good = KeyPlan {
            path: "op/key".into(),
            size: 2048,
            fixed: false,
        };
        assert_eq!(validate_rsa(&good, &entry).0, CheckStatus::Ok);

        let wrong_size = KeyPlan {
            path: "op/key".into(),
            size: 4096,
            fixed: false,
        };
        let (status, message) = validate_rsa(&wrong_size, &entry);
        assert_eq!(status, CheckStatus::Error);
        assert!(message.contains("2048 bits, expected 4096"));

        // mismatched public key
        let other = Rsa::generate(2048).unwrap();
        entry.insert(
            "public".to_string(),
            String::from_utf8(
                PKey::from_rsa(other).unwrap().public_key_to_pem().unwrap(),
            )
            .unwrap(),
        );
        let (status, message) = validate_rsa(&good, &entry);
        assert_eq!(status, CheckStatus::Error);
        assert!(message.contains("not derived from"));
    }

    #[test]
    fn test_ssh_public_key_derivation() {
        let rsa = Rsa::generate(2048).unwrap();
        let derived = ssh_public_key(&rsa);
        assert!(derived.starts_with("ssh-rsa AAAAB3NzaC1yc2E"));

        let mut entry = BTreeMap::new();
        entry.insert(
            "private".to_string(),
            String::from_utf8(rsa.private_key_to_pem().unwrap()).unwrap(),
        );
        entry.insert("public".to_string(), format!("{} genesis", derived));
        entry.insert("fingerprint".to_string(), "ab:cd".to_string());

        let plan = KeyPlan {
            path: "op/ssh".into(),
            size: 2048,
            fixed: false,
        };
        assert_eq!(validate_ssh(&plan, &entry).0, CheckStatus::Ok);

        entry.insert("public".to_string(), "ssh-rsa AAAAdGFtcGVyZWQ= x".to_string());
        assert_eq!(validate_ssh(&plan, &entry).0, CheckStatus::Error);
    }

    #[test]
    fn test_random_length_and_charset() {
        let mut entry = BTreeMap::new();
        entry.insert("password".to_string(), "abc123".to_string());

        let mut plan = RandomPlan {
            path: "users/admin".into(),
            key: "password".into(),
            size: 6,
            format: None,
            destination: None,
            valid_chars: None,
            fixed: false,
        };
        assert_eq!(validate_random(&plan, &entry).0, CheckStatus::Ok);

        plan.size = 8;
        let (status, message) = validate_random(&plan, &entry);
        assert_eq!(status, CheckStatus::Error);
        assert!(message.contains("6 characters, expected 8"));

        plan.size = 6;
        plan.valid_chars = Some("a-z".to_string());
        let (status, message) = validate_random(&plan, &entry);
        assert_eq!(status, CheckStatus::Error);
        assert!(message.contains("outside [a-z]"));
    }

    #[test]
    fn test_dhparams_structural() {
        let dh = Dh::generate_params(512, 2).unwrap();
        let pem = String::from_utf8(dh.params_to_pem().unwrap()).unwrap();

        let mut entry = BTreeMap::new();
        entry.insert("dhparam-pem".to_string(), pem);
        assert_eq!(validate_dhparams(&entry).0, CheckStatus::Ok);

        entry.insert("dhparam-pem".to_string(), "garbage".to_string());
        assert_eq!(validate_dhparams(&entry).0, CheckStatus::Error);
    }
}
