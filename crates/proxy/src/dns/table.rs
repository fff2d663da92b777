use std::collections::HashMap;
use std::net::IpAddr;

use hickory_proto::op::ResponseCode;
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use mesh_dns_domain::{DnsTable, DomainError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// One locally-served answer set: the response code for the name and the
/// pre-built records attached verbatim on a hit. An entry with no records
/// and `NoError` yields a "no error, no data" response (e.g. AAAA for an
/// IPv4-only name).
#[derive(Debug, Clone)]
pub struct TableEntry {
    pub rcode: ResponseCode,
    pub records: Vec<Record>,
}

impl TableEntry {
    fn empty() -> Self {
        Self {
            rcode: ResponseCode::NoError,
            records: Vec::new(),
        }
    }
}

/// Immutable snapshot of the locally-known names, keyed by fully-qualified
/// lowercase name. Built fresh on every reload and published wholesale; a
/// snapshot is never mutated once it is visible to readers.
#[derive(Debug, Default)]
pub struct RecordTable {
    a: HashMap<Name, TableEntry>,
    aaaa: HashMap<Name, TableEntry>,
}

impl RecordTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a table from a control-plane payload.
    ///
    /// The cancellation token is checked up front and again before each
    /// input record; once it fires the whole build is abandoned and the
    /// caller keeps whatever table was published before, even for an empty
    /// batch. A record name that does not parse, or an IP literal that does
    /// not parse, is logged and skipped without affecting the rest of the
    /// batch.
    pub fn from_payload(
        payload: &DnsTable,
        cancel: &CancellationToken,
    ) -> Result<Self, DomainError> {
        if cancel.is_cancelled() {
            return Err(DomainError::ReloadCancelled);
        }

        let mut table = Self::empty();

        for record in &payload.records {
            if cancel.is_cancelled() {
                return Err(DomainError::ReloadCancelled);
            }

            let Some(fqdn) = parse_fqdn(&record.name) else {
                continue;
            };

            let mut a_entry = TableEntry::empty();
            let mut aaaa_entry = TableEntry::empty();

            for literal in &record.ips {
                let addr: IpAddr = match literal.parse() {
                    Ok(addr) => addr,
                    Err(e) => {
                        warn!(ip = %literal, name = %record.name, error = %e, "Skipping unparseable IP literal");
                        continue;
                    }
                };

                // Legacy family split kept for compatibility with existing
                // control planes: a dot means IPv4, otherwise IPv6.
                if literal.contains('.') {
                    match addr {
                        IpAddr::V4(v4) => a_entry.records.push(Record::from_rdata(
                            fqdn.clone(),
                            payload.ttl,
                            RData::A(A(v4)),
                        )),
                        IpAddr::V6(_) => {
                            warn!(ip = %literal, name = %record.name, "IP literal classified as IPv4 but parsed as IPv6; skipping");
                        }
                    }
                } else {
                    match addr {
                        IpAddr::V6(v6) => aaaa_entry.records.push(Record::from_rdata(
                            fqdn.clone(),
                            payload.ttl,
                            RData::AAAA(AAAA(v6)),
                        )),
                        IpAddr::V4(_) => {
                            warn!(ip = %literal, name = %record.name, "IP literal classified as IPv6 but parsed as IPv4; skipping");
                        }
                    }
                }
            }

            table.a.insert(fqdn.clone(), a_entry);
            table.aaaa.insert(fqdn, aaaa_entry);
        }

        Ok(table)
    }

    /// Exact-name lookup. Only A and AAAA are served locally; any other
    /// type misses and falls through to upstream.
    pub fn lookup(&self, query_type: RecordType, name: &Name) -> Option<&TableEntry> {
        match query_type {
            RecordType::A => self.a.get(name),
            RecordType::AAAA => self.aaaa.get(name),
            _ => None,
        }
    }

    /// Number of locally-known names.
    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }
}

fn parse_fqdn(raw: &str) -> Option<Name> {
    match Name::from_utf8(raw) {
        Ok(mut name) => {
            name.set_fqdn(true);
            Some(name.to_lowercase())
        }
        Err(e) => {
            warn!(name = %raw, error = %e, "Skipping record with invalid name");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_dns_domain::DnsTableRecord;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn payload(ttl: u32, records: &[(&str, &[&str])]) -> DnsTable {
        DnsTable {
            ttl,
            records: records
                .iter()
                .map(|(name, ips)| DnsTableRecord {
                    name: name.to_string(),
                    ips: ips.iter().map(|ip| ip.to_string()).collect(),
                })
                .collect(),
        }
    }

    fn name(raw: &str) -> Name {
        Name::from_utf8(raw).unwrap()
    }

    #[test]
    fn builds_both_families_from_mixed_literals() {
        let table = RecordTable::from_payload(
            &payload(123, &[("example.com", &["240.0.0.1", "::2"])]),
            &CancellationToken::new(),
        )
        .unwrap();

        let a = table.lookup(RecordType::A, &name("example.com.")).unwrap();
        assert_eq!(a.rcode, ResponseCode::NoError);
        assert_eq!(a.records.len(), 1);
        assert_eq!(a.records[0].ttl(), 123);
        assert_eq!(
            a.records[0].data().and_then(|d| d.as_a()),
            Some(&A(Ipv4Addr::new(240, 0, 0, 1)))
        );

        let aaaa = table
            .lookup(RecordType::AAAA, &name("example.com."))
            .unwrap();
        assert_eq!(aaaa.records.len(), 1);
        assert_eq!(
            aaaa.records[0].data().and_then(|d| d.as_aaaa()),
            Some(&AAAA(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 2)))
        );
    }

    #[test]
    fn keys_are_fully_qualified() {
        let table = RecordTable::from_payload(
            &payload(60, &[("example.com", &["10.0.0.1"])]),
            &CancellationToken::new(),
        )
        .unwrap();

        // The published key is the trailing-dot form.
        assert!(table.lookup(RecordType::A, &name("example.com.")).is_some());
    }

    #[test]
    fn ipv4_only_name_still_gets_empty_aaaa_entry() {
        let table = RecordTable::from_payload(
            &payload(60, &[("v4only.local", &["10.1.2.3"])]),
            &CancellationToken::new(),
        )
        .unwrap();

        let aaaa = table
            .lookup(RecordType::AAAA, &name("v4only.local."))
            .unwrap();
        assert_eq!(aaaa.rcode, ResponseCode::NoError);
        assert!(aaaa.records.is_empty());
    }

    #[test]
    fn bad_literal_skips_only_itself() {
        let table = RecordTable::from_payload(
            &payload(
                60,
                &[
                    ("first.local", &["10.0.0.1", "not-an-ip", "::1"]),
                    ("second.local", &["10.0.0.2"]),
                ],
            ),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        let first_a = table.lookup(RecordType::A, &name("first.local.")).unwrap();
        assert_eq!(first_a.records.len(), 1);
        let first_aaaa = table
            .lookup(RecordType::AAAA, &name("first.local."))
            .unwrap();
        assert_eq!(first_aaaa.records.len(), 1);
        assert!(table.lookup(RecordType::A, &name("second.local.")).is_some());
    }

    #[test]
    fn mapped_v6_literal_with_dot_is_dropped_from_a_family() {
        // Contains a dot, so the heuristic routes it to the A family, where
        // the parsed IPv6 value cannot be represented.
        let table = RecordTable::from_payload(
            &payload(60, &[("mapped.local", &["::ffff:192.0.2.1"])]),
            &CancellationToken::new(),
        )
        .unwrap();

        let a = table.lookup(RecordType::A, &name("mapped.local.")).unwrap();
        assert!(a.records.is_empty());
        let aaaa = table
            .lookup(RecordType::AAAA, &name("mapped.local."))
            .unwrap();
        assert!(aaaa.records.is_empty());
    }

    #[test]
    fn cancelled_token_aborts_build() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = RecordTable::from_payload(
            &payload(60, &[("example.com", &["10.0.0.1"])]),
            &cancel,
        );

        assert!(matches!(result, Err(DomainError::ReloadCancelled)));
    }

    #[test]
    fn cancelled_token_aborts_even_an_empty_batch() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        // No records means no per-record checks; the build must still abort
        // instead of producing an empty table.
        let result = RecordTable::from_payload(&payload(60, &[]), &cancel);

        assert!(matches!(result, Err(DomainError::ReloadCancelled)));
    }

    #[test]
    fn unsupported_type_never_hits() {
        let table = RecordTable::from_payload(
            &payload(60, &[("example.com", &["10.0.0.1"])]),
            &CancellationToken::new(),
        )
        .unwrap();

        assert!(table.lookup(RecordType::TXT, &name("example.com.")).is_none());
        assert!(table.lookup(RecordType::MX, &name("example.com.")).is_none());
    }

    #[test]
    fn invalid_name_skips_record_but_not_batch() {
        let table = RecordTable::from_payload(
            &payload(60, &[("bad..name..", &["10.0.0.1"]), ("good.local", &["10.0.0.2"])]),
            &CancellationToken::new(),
        )
        .unwrap();

        assert!(table.lookup(RecordType::A, &name("good.local.")).is_some());
    }
}
