//! AS-path parsing and analysis.
//!
//! The decoder emits paths as whitespace-separated tokens, each either a
//! decimal ASN or an AS set (`{64500,64501}`). Analysis walks the path in
//! reverse, origin to collector, accumulating poisoning indicators and the
//! relationship sequence used for the Gao-Rexford check.

use crate::error::CollectorError;
use crate::models::topology::{AsTopology, Relationship};
use std::collections::HashSet;
use std::ops::RangeInclusive;

/// Highest ASN allocated by the RIRs as of the snapshot era (2023); anything
/// above is unassigned and treated as path poisoning.
pub const MAX_ASN: u32 = 401_308;

/// One token of an AS path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathToken {
    Asn(u32),
    Set(Vec<u32>),
}

impl PathToken {
    fn asns(&self) -> &[u32] {
        match self {
            PathToken::Asn(asn) => std::slice::from_ref(asn),
            PathToken::Set(asns) => asns,
        }
    }

    /// The single ASN standing in for this token: the ASN itself, or the
    /// first element of an AS set (best guess, matching origin selection).
    fn representative(&self) -> Option<u32> {
        self.asns().first().copied()
    }
}

/// Parses a decoder-formatted AS path. Sets may contain spaces after commas
/// (`{64500, 64501}`), so brace groups are re-joined across whitespace
/// before splitting on commas.
pub fn parse_as_path(path: &str) -> Result<Vec<PathToken>, CollectorError> {
    let mut tokens = Vec::new();
    let mut words = path.split_whitespace();
    while let Some(word) = words.next() {
        if let Some(rest) = word.strip_prefix('{') {
            let mut set_body = rest.to_string();
            while !set_body.ends_with('}') {
                match words.next() {
                    Some(next) => set_body.push_str(next),
                    None => {
                        return Err(CollectorError::RecordError(format!(
                            "unterminated AS set in path {path:?}"
                        )))
                    }
                }
            }
            set_body.pop();
            let mut asns = Vec::new();
            for part in set_body.split(',') {
                if part.is_empty() {
                    continue;
                }
                let asn = part.parse::<u32>().map_err(|_| {
                    CollectorError::RecordError(format!(
                        "unparseable AS set member {part:?} in path {path:?}"
                    ))
                })?;
                asns.push(asn);
            }
            if asns.is_empty() {
                return Err(CollectorError::RecordError(format!(
                    "empty AS set in path {path:?}"
                )));
            }
            tokens.push(PathToken::Set(asns));
        } else {
            let asn = word.parse::<u32>().map_err(|_| {
                CollectorError::RecordError(format!(
                    "unparseable AS path token {word:?} in path {path:?}"
                ))
            })?;
            tokens.push(PathToken::Asn(asn));
        }
    }
    if tokens.is_empty() {
        return Err(CollectorError::RecordError("empty AS path".to_string()));
    }
    Ok(tokens)
}

/// The reserved / non-public ASN set used for poisoning detection.
///
/// The default covers the IANA special-purpose registry (last updated
/// 2015-08-07) plus everything above [MAX_ASN]; deployments tracking newer
/// allocations can supply their own ranges.
#[derive(Debug, Clone)]
pub struct ReservedAsns {
    ranges: Vec<RangeInclusive<u32>>,
    max_asn: u32,
}

impl Default for ReservedAsns {
    fn default() -> Self {
        ReservedAsns {
            ranges: vec![
                0..=0,                       // RFC7607
                112..=112,                   // RFC7534
                23456..=23456,               // RFC6793
                64496..=64511,               // RFC5398
                64512..=65534,               // RFC6996
                65535..=65535,               // RFC7300
                65536..=65551,               // RFC5398
                4200000000..=4294967294,     // RFC6996
                4294967295..=4294967295,     // RFC7300
            ],
            max_asn: MAX_ASN,
        }
    }
}

impl ReservedAsns {
    pub fn new(ranges: Vec<RangeInclusive<u32>>, max_asn: u32) -> Self {
        ReservedAsns { ranges, max_asn }
    }

    /// True for ASNs that cannot legitimately appear in a public AS path.
    pub fn is_invalid(&self, asn: u32) -> bool {
        asn > self.max_asn || self.ranges.iter().any(|range| range.contains(&asn))
    }
}

/// Everything the enrichment core derives from one AS path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsPathAnalysis {
    /// First token of the path (the vantage point).
    pub collector_asn: u32,
    /// Last token of the path; first element if that token is an AS set.
    pub origin_asn: u32,
    /// Reserved or above-[MAX_ASN] ASNs, in origin-to-collector order.
    pub invalid_as_path_asns: Vec<u32>,
    pub ixps_in_as_path: Vec<u32>,
    pub prepending: bool,
    pub as_path_loop: bool,
    pub valley_free_caida_path: bool,
    pub non_caida_asns: Vec<u32>,
    pub input_clique_split: bool,
    pub missing_caida_relationship: bool,
    /// Whether the path contains at least one AS set.
    pub as_sets: bool,
}

/// Analyzes a parsed path against the topology. AS-set members are visited
/// individually, in the order the decoder emitted them.
pub fn analyze_as_path(
    tokens: &[PathToken],
    topology: &AsTopology,
    reserved: &ReservedAsns,
) -> AsPathAnalysis {
    // tokens is non-empty by parse_as_path's contract
    let collector_asn = tokens.first().and_then(PathToken::representative).unwrap_or(0);
    let origin_asn = tokens.last().and_then(PathToken::representative).unwrap_or(0);
    let as_sets = tokens.iter().any(|t| matches!(t, PathToken::Set(_)));

    let mut invalid_as_path_asns = Vec::new();
    let mut ixps_in_as_path = Vec::new();
    let mut non_caida_asns = Vec::new();
    let mut relationships = Vec::new();

    let mut prepending = false;
    let mut as_path_loop = false;
    let mut input_clique_split = false;
    let mut missing_caida_relationship = false;

    let mut last_asn: Option<u32> = None;
    let mut seen: HashSet<u32> = HashSet::new();
    let mut seen_clique = false;
    let mut gap_after_clique = false;

    for token in tokens.iter().rev() {
        for &asn in token.asns() {
            if last_asn == Some(asn) {
                prepending = true;
                as_path_loop = true;
            } else if seen.contains(&asn) {
                as_path_loop = true;
            }
            seen.insert(asn);

            if reserved.is_invalid(asn) {
                invalid_as_path_asns.push(asn);
            }
            if topology.is_ixp(asn) {
                ixps_in_as_path.push(asn);
            }
            if !topology.contains(asn) {
                non_caida_asns.push(asn);
                missing_caida_relationship = true;
            }

            if topology.is_input_clique(asn) {
                if gap_after_clique {
                    input_clique_split = true;
                }
                seen_clique = true;
            } else if seen_clique {
                gap_after_clique = true;
            }

            if let Some(last) = last_asn {
                if last != asn && topology.contains(last) && topology.contains(asn) {
                    match topology.relationship(last, asn) {
                        Some(relationship) => relationships.push(relationship),
                        // known ASNs with no known edge: flag and drop
                        None => missing_caida_relationship = true,
                    }
                }
            }
            last_asn = Some(asn);
        }
    }

    AsPathAnalysis {
        collector_asn,
        origin_asn,
        invalid_as_path_asns,
        ixps_in_as_path,
        prepending,
        as_path_loop,
        valley_free_caida_path: is_valley_free(&relationships),
        non_caida_asns,
        input_clique_split,
        missing_caida_relationship,
        as_sets,
    }
}

/// Gao-Rexford check over an origin-outward relationship sequence: at most
/// one PEER edge, and once a CUSTOMER edge is followed by anything else no
/// further CUSTOMER edge may appear.
pub fn is_valley_free(relationships: &[Relationship]) -> bool {
    let mut seen_peer = false;
    let mut seen_customer = false;
    let mut customer_closed = false;
    for relationship in relationships {
        match relationship {
            Relationship::Peer => {
                if seen_peer {
                    return false;
                }
                seen_peer = true;
                if seen_customer {
                    customer_closed = true;
                }
            }
            Relationship::Customer => {
                if customer_closed {
                    return false;
                }
                seen_customer = true;
            }
            Relationship::Provider => {
                if seen_customer {
                    customer_closed = true;
                }
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_analysis(path: &str) -> AsPathAnalysis {
        let tokens = parse_as_path(path).unwrap();
        analyze_as_path(&tokens, &AsTopology::new(), &ReservedAsns::default())
    }

    #[test]
    fn test_parse_plain_path() {
        let tokens = parse_as_path("64500 64501 65000").unwrap();
        assert_eq!(
            tokens,
            vec![
                PathToken::Asn(64500),
                PathToken::Asn(64501),
                PathToken::Asn(65000)
            ]
        );
    }

    #[test]
    fn test_parse_as_set() {
        let tokens = parse_as_path("64500 {64501,65000}").unwrap();
        assert_eq!(
            tokens,
            vec![
                PathToken::Asn(64500),
                PathToken::Set(vec![64501, 65000])
            ]
        );
        // decoder variants put spaces after commas
        let tokens = parse_as_path("64500 {64501, 65000}").unwrap();
        assert_eq!(tokens[1], PathToken::Set(vec![64501, 65000]));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_as_path("64500 as65000").is_err());
        assert!(parse_as_path("{64500").is_err());
        assert!(parse_as_path("").is_err());
    }

    #[test]
    fn test_collector_and_origin_selection() {
        let analysis = plain_analysis("64500 64501 65000");
        assert_eq!(analysis.collector_asn, 64500);
        assert_eq!(analysis.origin_asn, 65000);
        assert!(!analysis.as_sets);
    }

    #[test]
    fn test_single_as_set_path() {
        let analysis = plain_analysis("{65000,65001}");
        assert_eq!(analysis.collector_asn, 65000);
        assert_eq!(analysis.origin_asn, 65000);
        assert!(analysis.as_sets);
    }

    #[test]
    fn test_prepending_implies_loop() {
        let analysis = plain_analysis("1 2 2 3 2 4");
        assert!(analysis.prepending);
        assert!(analysis.as_path_loop);
    }

    #[test]
    fn test_nonadjacent_repeat_is_loop_not_prepending() {
        let analysis = plain_analysis("1 2 3 2");
        assert!(!analysis.prepending);
        assert!(analysis.as_path_loop);
    }

    #[test]
    fn test_reserved_and_over_max_asns_flagged() {
        let analysis = plain_analysis("1 64512 2 401309 3");
        // origin-to-collector order
        assert_eq!(analysis.invalid_as_path_asns, vec![401309, 64512]);
    }

    #[test]
    fn test_input_clique_split() {
        let mut topology = AsTopology::new();
        topology.add_input_clique_asn(64500);
        topology.add_input_clique_asn(65000);
        let tokens = parse_as_path("64500 64501 65000").unwrap();
        let analysis = analyze_as_path(&tokens, &topology, &ReservedAsns::default());
        assert!(analysis.input_clique_split);
        assert_eq!(analysis.non_caida_asns, vec![64501]);
        assert!(analysis.missing_caida_relationship);
    }

    #[test]
    fn test_adjacent_clique_is_not_split() {
        let mut topology = AsTopology::new();
        topology.add_input_clique_asn(64500);
        topology.add_input_clique_asn(65000);
        topology.add_peer_peer(64500, 65000);
        let tokens = parse_as_path("64500 65000 65001").unwrap();
        let analysis = analyze_as_path(&tokens, &topology, &ReservedAsns::default());
        assert!(!analysis.input_clique_split);
    }

    #[test]
    fn test_ixp_traversal() {
        let mut topology = AsTopology::new();
        topology.add_ixp_asn(6695);
        let tokens = parse_as_path("1 6695 2").unwrap();
        let analysis = analyze_as_path(&tokens, &topology, &ReservedAsns::default());
        assert_eq!(analysis.ixps_in_as_path, vec![6695]);
    }

    #[test]
    fn test_unknown_relationship_flagged_and_dropped() {
        let mut topology = AsTopology::new();
        topology.add_provider_customer(1, 2);
        topology.add_input_clique_asn(3);
        // 2 and 3 are both known but unrelated
        let tokens = parse_as_path("3 2 1").unwrap();
        let analysis = analyze_as_path(&tokens, &topology, &ReservedAsns::default());
        assert!(analysis.missing_caida_relationship);
        assert!(analysis.non_caida_asns.is_empty());
        // the surviving sequence (1->2 CUSTOMER) is valley-free
        assert!(analysis.valley_free_caida_path);
    }

    #[test]
    fn test_valley_free_sequences() {
        use Relationship::*;
        assert!(is_valley_free(&[]));
        assert!(is_valley_free(&[Provider, Provider, Peer, Customer]));
        assert!(is_valley_free(&[Customer, Customer]));
        // second peer edge
        assert!(!is_valley_free(&[Peer, Provider, Peer]));
        // customer after a closed customer run
        assert!(!is_valley_free(&[Customer, Peer, Customer]));
        assert!(!is_valley_free(&[Customer, Provider, Customer]));
    }

    #[test]
    fn test_valley_free_on_real_path() {
        let mut topology = AsTopology::new();
        // origin-outward: 4 -> 3 downhill, 3 -> 2 uphill, 2 -> 1 downhill,
        // which resumes CUSTOMER edges after the run was closed
        topology.add_provider_customer(4, 3);
        topology.add_provider_customer(2, 3);
        topology.add_provider_customer(2, 1);
        let tokens = parse_as_path("1 2 3 4").unwrap();
        let analysis = analyze_as_path(&tokens, &topology, &ReservedAsns::default());
        assert!(!analysis.valley_free_caida_path);

        // plain customer chain all the way down stays valley-free
        let mut chain = AsTopology::new();
        chain.add_provider_customer(3, 2);
        chain.add_provider_customer(2, 1);
        let tokens = parse_as_path("1 2 3").unwrap();
        let analysis = analyze_as_path(&tokens, &chain, &ReservedAsns::default());
        assert!(analysis.valley_free_caida_path);
    }
}
