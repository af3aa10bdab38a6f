//! Decoded and enriched record models.
//!
//! A decoded record is one pipe-separated line from the external MRT decoder.
//! Field values are kept verbatim; the pipeline only interprets the prefix
//! and AS-path columns, everything else passes through to the corpus.

use crate::error::CollectorError;
use crate::models::aspath::AsPathAnalysis;
use crate::models::incidents::IncidentRecord;
use crate::models::registry::ExtrapolatorIds;
use crate::models::roa::{RoaRouted, RoaValidity};
use itertools::Itertools;
use std::fmt::Display;
use std::io::{self, Write};

/// Column names of the decoder's pipe-separated output, in emission order.
pub const DECODED_FIELDS: [&str; 14] = [
    "aggr_asn",
    "aggr_ip",
    "as_path",
    "atomic_aggregate",
    "communities",
    "local_pref",
    "only_to_customer",
    "origin",
    "origin_asns",
    "peer_asn",
    "peer_ip",
    "prefix",
    "timestamp",
    "type",
];

/// Index of the prefix column in the decoded stream, used by the prefix
/// harvester without parsing whole records.
pub const PREFIX_COLUMN: usize = 11;

/// One line of decoder output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub aggr_asn: String,
    pub aggr_ip: String,
    pub as_path: String,
    pub atomic_aggregate: String,
    pub communities: String,
    pub local_pref: String,
    pub only_to_customer: String,
    pub origin: String,
    pub origin_asns: String,
    pub peer_asn: String,
    pub peer_ip: String,
    pub prefix: String,
    pub timestamp: String,
    pub record_type: String,
}

impl DecodedRecord {
    /// True for the optional header line some decoder versions emit.
    pub fn is_header_line(line: &str) -> bool {
        line.starts_with("aggr_asn|")
    }

    pub fn from_psv_line(line: &str) -> Result<DecodedRecord, CollectorError> {
        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() != DECODED_FIELDS.len() {
            return Err(CollectorError::RecordError(format!(
                "expected {} fields, got {}: {line:?}",
                DECODED_FIELDS.len(),
                fields.len()
            )));
        }
        Ok(DecodedRecord {
            aggr_asn: fields[0].to_string(),
            aggr_ip: fields[1].to_string(),
            as_path: fields[2].to_string(),
            atomic_aggregate: fields[3].to_string(),
            communities: fields[4].to_string(),
            local_pref: fields[5].to_string(),
            only_to_customer: fields[6].to_string(),
            origin: fields[7].to_string(),
            origin_asns: fields[8].to_string(),
            peer_asn: fields[9].to_string(),
            peer_ip: fields[10].to_string(),
            prefix: fields[11].to_string(),
            timestamp: fields[12].to_string(),
            record_type: fields[13].to_string(),
        })
    }
}

/// Column names of the enriched per-block TSV output, in emission order:
/// the decoded columns, the extrapolator IDs, the ROA verdict, the incident
/// columns, then the AS-path analysis.
pub const ENRICHED_FIELDS: [&str; 54] = [
    "aggr_asn",
    "aggr_ip",
    "as_path",
    "atomic_aggregate",
    "communities",
    "local_pref",
    "only_to_customer",
    "origin",
    "origin_asns",
    "peer_asn",
    "peer_ip",
    "prefix",
    "timestamp",
    "type",
    "prefix_id",
    "block_id",
    "block_prefix_id",
    "roa_validity",
    "roa_routed",
    "bgpstream_event_number",
    "bgpstream_event_type",
    "bgpstream_country",
    "bgpstream_start_time",
    "bgpstream_end_time",
    "bgpstream_url",
    "hijack_detected_origin_name",
    "hijack_detected_origin_number",
    "hijack_expected_origin_name",
    "hijack_expected_origin_number",
    "hijack_expected_prefix",
    "hijack_more_specific_prefix",
    "leak_origin_as_name",
    "leak_origin_as_number",
    "leaked_prefix",
    "leaked_to_name",
    "leaked_to_number",
    "leaker_as_name",
    "leaker_as_number",
    "outage_as_name",
    "outage_as_number",
    "outage_number_prefixes_affected",
    "outage_percent_prefixes_affected",
    "collector_asn",
    "origin_asn",
    "invalid_as_path_asns",
    "ixps_in_as_path",
    "prepending",
    "as_path_loop",
    "valley_free_caida_path",
    "non_caida_asns",
    "input_clique_split",
    "missing_caida_relationship",
    "as_sets",
    "source_url",
];

/// Tab-joined header row written once per shard.
pub fn enriched_header() -> String {
    ENRICHED_FIELDS.join("\t")
}

fn opt<T: Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

fn list<T: Display>(values: &[T]) -> String {
    format!("[{}]", values.iter().join(", "))
}

/// One decoded record joined with everything the enrichment core knows
/// about it. Borrowed views only; rows are serialized straight to the shard
/// writers.
#[derive(Debug, Clone)]
pub struct EnrichedRecord<'a> {
    pub decoded: &'a DecodedRecord,
    pub ids: ExtrapolatorIds,
    pub roa_validity: RoaValidity,
    pub roa_routed: RoaRouted,
    pub incident: Option<&'a IncidentRecord>,
    pub path: &'a AsPathAnalysis,
    pub source_url: &'a str,
}

impl EnrichedRecord<'_> {
    pub fn tsv_fields(&self) -> Vec<String> {
        let d = self.decoded;
        let p = self.path;
        let empty_incident = IncidentRecord::default();
        let i = self.incident.unwrap_or(&empty_incident);
        vec![
            d.aggr_asn.clone(),
            d.aggr_ip.clone(),
            d.as_path.clone(),
            d.atomic_aggregate.clone(),
            d.communities.clone(),
            d.local_pref.clone(),
            d.only_to_customer.clone(),
            d.origin.clone(),
            d.origin_asns.clone(),
            d.peer_asn.clone(),
            d.peer_ip.clone(),
            d.prefix.clone(),
            d.timestamp.clone(),
            d.record_type.clone(),
            self.ids.prefix_id.to_string(),
            self.ids.block_id.to_string(),
            self.ids.block_prefix_id.to_string(),
            self.roa_validity.code().to_string(),
            self.roa_routed.code().to_string(),
            opt(&i.event_number),
            opt(&i.event_type),
            opt(&i.country),
            opt(&i.start_time),
            opt(&i.end_time),
            opt(&i.url),
            opt(&i.hijack_detected_origin_name),
            opt(&i.hijack_detected_origin_number),
            opt(&i.hijack_expected_origin_name),
            opt(&i.hijack_expected_origin_number),
            opt(&i.hijack_expected_prefix),
            opt(&i.hijack_more_specific_prefix),
            opt(&i.leak_origin_as_name),
            opt(&i.leak_origin_as_number),
            opt(&i.leaked_prefix),
            list(&i.leaked_to_name),
            list(&i.leaked_to_number),
            opt(&i.leaker_as_name),
            opt(&i.leaker_as_number),
            opt(&i.outage_as_name),
            opt(&i.outage_as_number),
            opt(&i.outage_number_prefixes_affected),
            opt(&i.outage_percent_prefixes_affected),
            p.collector_asn.to_string(),
            p.origin_asn.to_string(),
            list(&p.invalid_as_path_asns),
            list(&p.ixps_in_as_path),
            p.prepending.to_string(),
            p.as_path_loop.to_string(),
            p.valley_free_caida_path.to_string(),
            list(&p.non_caida_asns),
            p.input_clique_split.to_string(),
            p.missing_caida_relationship.to_string(),
            p.as_sets.to_string(),
            self.source_url.to_string(),
        ]
    }

    pub fn write_tsv<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "{}", self.tsv_fields().join("\t"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::aspath::{analyze_as_path, parse_as_path, ReservedAsns};
    use crate::models::topology::AsTopology;

    const LINE: &str =
        "65000|10.0.0.9|64500 64501 65000|AG|64500:100|100||IGP|65000|64500|10.0.0.1|10.0.0.0/24|1702339200|A";

    #[test]
    fn test_from_psv_line() {
        let record = DecodedRecord::from_psv_line(LINE).unwrap();
        assert_eq!(record.prefix, "10.0.0.0/24");
        assert_eq!(record.as_path, "64500 64501 65000");
        assert_eq!(record.only_to_customer, "");
        assert_eq!(record.record_type, "A");
    }

    #[test]
    fn test_wrong_field_count_rejected() {
        assert!(DecodedRecord::from_psv_line("a|b|c").is_err());
        assert!(DecodedRecord::from_psv_line(&format!("{LINE}|extra")).is_err());
    }

    #[test]
    fn test_header_line_detection() {
        assert!(DecodedRecord::is_header_line(&DECODED_FIELDS.join("|")));
        assert!(!DecodedRecord::is_header_line(LINE));
    }

    #[test]
    fn test_header_and_row_have_same_arity() {
        let record = DecodedRecord::from_psv_line(LINE).unwrap();
        let tokens = parse_as_path(&record.as_path).unwrap();
        let analysis = analyze_as_path(&tokens, &AsTopology::new(), &ReservedAsns::default());
        let enriched = EnrichedRecord {
            decoded: &record,
            ids: ExtrapolatorIds {
                prefix_id: 5,
                block_id: 0,
                block_prefix_id: 5,
            },
            roa_validity: RoaValidity::Unknown,
            roa_routed: RoaRouted::Unknown,
            incident: None,
            path: &analysis,
            source_url: "http://example.com/rib.bz2",
        };
        let fields = enriched.tsv_fields();
        assert_eq!(fields.len(), ENRICHED_FIELDS.len());
        assert_eq!(fields[14], "5"); // prefix_id
        assert_eq!(fields[17], "1"); // roa_validity UNKNOWN
        assert_eq!(fields[19], ""); // no incident
        assert_eq!(fields[44], "[]"); // invalid_as_path_asns
        assert_eq!(*fields.last().unwrap(), "http://example.com/rib.bz2");
    }
}
