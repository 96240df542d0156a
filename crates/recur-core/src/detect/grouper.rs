//! Candidate grouping
//!
//! Three passes in strict priority order. A transaction that is matchable by
//! a pass is claimed by it, even when its group turns out too small, so it
//! never shows up in a lower-reliability pass:
//! 1. `partner_info` - counterparty IBAN + name + payment method
//! 2. `merchant_info` - merchant + payment method + card brand
//! 3. `description_fuzzy` - similar normalized description/reference text

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, error};

use crate::config::{FuzzyConfig, PassMultipliers};
use crate::error::{Error, Result};
use crate::models::{GroupingPass, Transaction};

use super::similarity::{DescriptionNormalizer, TextSimilarity};

/// A transaction with the fields detection needs known to be present
#[derive(Debug, Clone, Copy)]
pub struct DatedTransaction<'a> {
    pub tx: &'a Transaction,
    pub date: NaiveDate,
    pub amount: Decimal,
}

impl DatedTransaction<'_> {
    pub fn id(&self) -> i64 {
        self.tx.id
    }
}

/// Transactions believed to be the same recurring obligation
#[derive(Debug, Clone)]
pub struct CandidateGroup<'a> {
    pub pass: GroupingPass,
    /// Normalized grouping key, unique within the pass
    pub key: String,
    /// Reliability multiplier of the pass
    pub multiplier: f64,
    /// Members ordered by (date, id)
    pub members: Vec<DatedTransaction<'a>>,
}

/// Result of partitioning a window
#[derive(Debug, Default)]
pub struct Grouping<'a> {
    pub groups: Vec<CandidateGroup<'a>>,
    /// Transactions with nothing any pass could match on
    pub ungroupable: Vec<i64>,
}

/// Partitions transactions into candidate groups
pub struct CandidateGrouper {
    normalizer: DescriptionNormalizer,
    similarity: Box<dyn TextSimilarity>,
    fuzzy: FuzzyConfig,
    multipliers: PassMultipliers,
}

impl CandidateGrouper {
    pub fn new(
        normalizer: DescriptionNormalizer,
        similarity: Box<dyn TextSimilarity>,
        fuzzy: FuzzyConfig,
        multipliers: PassMultipliers,
    ) -> Self {
        Self {
            normalizer,
            similarity,
            fuzzy,
            multipliers,
        }
    }

    pub fn normalizer(&self) -> &DescriptionNormalizer {
        &self.normalizer
    }

    /// Partition `transactions` (expected in (date, id) order)
    pub fn group<'a>(&self, transactions: &[DatedTransaction<'a>]) -> Result<Grouping<'a>> {
        let mut grouping = Grouping::default();

        let mut remaining: Vec<DatedTransaction<'a>> = Vec::new();
        let mut by_partner: BTreeMap<String, Vec<DatedTransaction<'a>>> = BTreeMap::new();
        for tx in transactions {
            match partner_key(tx.tx) {
                Some(key) => by_partner.entry(key).or_default().push(*tx),
                None => remaining.push(*tx),
            }
        }
        self.collect_keyed(GroupingPass::PartnerInfo, by_partner, &mut grouping);

        let mut unmatched: Vec<DatedTransaction<'a>> = Vec::new();
        let mut by_merchant: BTreeMap<String, Vec<DatedTransaction<'a>>> = BTreeMap::new();
        for tx in remaining {
            match merchant_key(tx.tx) {
                Some(key) => by_merchant.entry(key).or_default().push(tx),
                None => unmatched.push(tx),
            }
        }
        self.collect_keyed(GroupingPass::MerchantInfo, by_merchant, &mut grouping);

        self.group_fuzzy(unmatched, &mut grouping);

        verify_disjoint(&grouping.groups)?;
        Ok(grouping)
    }

    fn collect_keyed<'a>(
        &self,
        pass: GroupingPass,
        keyed: BTreeMap<String, Vec<DatedTransaction<'a>>>,
        grouping: &mut Grouping<'a>,
    ) {
        let multiplier = self.multipliers.for_pass(pass);
        for (key, members) in keyed {
            if members.len() < 2 {
                debug!(pass = %pass, key = %key, "Discarding single-transaction group");
                continue;
            }
            debug!(pass = %pass, key = %key, size = members.len(), "Formed candidate group");
            grouping.groups.push(CandidateGroup {
                pass,
                key,
                multiplier,
                members,
            });
        }
    }

    /// Greedy clustering: each unclaimed transaction seeds a cluster and claims
    /// every later unclaimed transaction whose text is similar to the seed
    fn group_fuzzy<'a>(
        &self,
        transactions: Vec<DatedTransaction<'a>>,
        grouping: &mut Grouping<'a>,
    ) {
        let mut candidates: Vec<(DatedTransaction<'a>, String)> = Vec::new();
        for tx in transactions {
            match self.fuzzy_text(tx.tx) {
                Some(text) => candidates.push((tx, text)),
                None => grouping.ungroupable.push(tx.id()),
            }
        }

        let pass = GroupingPass::DescriptionFuzzy;
        let multiplier = self.multipliers.for_pass(pass);
        let mut claimed = vec![false; candidates.len()];
        // (most frequent text, seed text, member indices)
        let mut clusters: Vec<(String, String, Vec<usize>)> = Vec::new();

        for seed in 0..candidates.len() {
            if claimed[seed] {
                continue;
            }
            claimed[seed] = true;
            let seed_text = candidates[seed].1.clone();
            let mut cluster = vec![seed];

            for other in (seed + 1)..candidates.len() {
                if claimed[other] {
                    continue;
                }
                let other_text = &candidates[other].1;
                if *other_text == seed_text
                    || self.similarity.similarity(&seed_text, other_text) >= self.fuzzy.threshold
                {
                    claimed[other] = true;
                    cluster.push(other);
                }
            }

            if cluster.len() < 2 {
                continue;
            }

            let texts = cluster.iter().map(|&i| candidates[i].1.as_str());
            let text = most_frequent(texts).unwrap_or(seed_text.as_str()).to_string();
            clusters.push((text, seed_text, cluster));
        }

        let mut shared: HashMap<&str, usize> = HashMap::new();
        for (text, _, _) in &clusters {
            *shared.entry(text.as_str()).or_insert(0) += 1;
        }
        let keys: Vec<String> = clusters
            .iter()
            .map(|(text, seed_text, _)| fuzzy_key(text, seed_text, shared[text.as_str()]))
            .collect();

        for (key, (_, _, cluster)) in keys.into_iter().zip(&clusters) {
            debug!(pass = %pass, key = %key, size = cluster.len(), "Formed candidate group");
            grouping.groups.push(CandidateGroup {
                pass,
                key,
                multiplier,
                members: cluster.iter().map(|&i| candidates[i].0).collect(),
            });
        }
    }

    /// Normalized description, falling back to the reference; None when too short
    fn fuzzy_text(&self, tx: &Transaction) -> Option<String> {
        let min_len = self.fuzzy.min_text_len.max(1);
        [&tx.description, &tx.reference]
            .into_iter()
            .map(|text| self.normalizer.normalize(text))
            .find(|text| text.chars().count() >= min_len)
    }
}

/// Grouping key of a fuzzy cluster
///
/// Clusters sharing their most frequent text are told apart by their seed
/// text, which is unique per cluster and survives other clusters appearing or
/// disappearing. Normalized text never contains `#`.
fn fuzzy_key(text: &str, seed_text: &str, sharing: usize) -> String {
    if sharing <= 1 || text == seed_text {
        text.to_string()
    } else {
        format!("{}#{}", text, seed_text)
    }
}

/// Lowercase and collapse internal whitespace
pub(crate) fn normalize_key_part(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn partner_key(tx: &Transaction) -> Option<String> {
    let iban: String = tx
        .partner_iban
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    if iban.is_empty() {
        return None;
    }
    Some(format!(
        "{}|{}|{}",
        iban,
        normalize_key_part(&tx.partner_name),
        normalize_key_part(&tx.payment_method)
    ))
}

fn merchant_key(tx: &Transaction) -> Option<String> {
    let merchant = normalize_key_part(&tx.merchant_name);
    if merchant.is_empty() {
        return None;
    }
    Some(format!(
        "{}|{}|{}",
        merchant,
        normalize_key_part(&tx.payment_method),
        normalize_key_part(&tx.card_brand)
    ))
}

/// Most frequent value; ties go to the lexicographically smallest
pub(crate) fn most_frequent<'v>(values: impl Iterator<Item = &'v str>) -> Option<&'v str> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    // BTreeMap iterates in ascending order, so the first maximum wins ties
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value)
}

/// Every transaction may belong to at most one group
fn verify_disjoint(groups: &[CandidateGroup<'_>]) -> Result<()> {
    let mut owner: HashMap<i64, (GroupingPass, &str)> = HashMap::new();
    for group in groups {
        for member in &group.members {
            if let Some((pass, key)) = owner.insert(member.id(), (group.pass, group.key.as_str())) {
                error!(
                    transaction_id = member.id(),
                    first_pass = %pass,
                    second_pass = %group.pass,
                    "Transaction claimed by two candidate groups"
                );
                return Err(Error::InvariantViolation(format!(
                    "transaction {} claimed by {}:{} and {}:{}",
                    member.id(),
                    pass,
                    key,
                    group.pass,
                    group.key
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::detect::similarity::TokenSetRatio;
    use crate::test_utils::{date, TxBuilder};

    fn grouper() -> CandidateGrouper {
        CandidateGrouper::new(
            DescriptionNormalizer::new().unwrap(),
            Box::new(TokenSetRatio),
            FuzzyConfig::default(),
            PassMultipliers::default(),
        )
    }

    fn dated(txs: &[Transaction]) -> Vec<DatedTransaction<'_>> {
        txs.iter()
            .map(|tx| DatedTransaction {
                tx,
                date: tx.date.unwrap(),
                amount: tx.amount.unwrap(),
            })
            .collect()
    }

    fn group_of(grouping: &Grouping<'_>, id: i64) -> Option<(GroupingPass, String)> {
        grouping
            .groups
            .iter()
            .find(|g| g.members.iter().any(|m| m.id() == id))
            .map(|g| (g.pass, g.key.clone()))
    }

    #[test]
    fn test_partner_pass_normalizes_key() {
        let txs = vec![
            TxBuilder::new(1, date(2024, 1, 1), "-15.99")
                .partner("DE89 3704 0044 0532 0130 00", "Stadtwerke  Nord")
                .payment_method("direct_debit")
                .build(),
            TxBuilder::new(2, date(2024, 2, 1), "-15.99")
                .partner("de89370400440532013000", "STADTWERKE NORD")
                .payment_method("DIRECT_DEBIT")
                .build(),
        ];
        let grouping = grouper().group(&dated(&txs)).unwrap();

        assert_eq!(grouping.groups.len(), 1);
        let group = &grouping.groups[0];
        assert_eq!(group.pass, GroupingPass::PartnerInfo);
        assert_eq!(group.key, "de89370400440532013000|stadtwerke nord|direct_debit");
        assert_eq!(group.multiplier, 1.0);
        assert_eq!(group.members.len(), 2);
    }

    #[test]
    fn test_merchant_pass_separates_card_brands() {
        let txs = vec![
            TxBuilder::new(1, date(2024, 1, 1), "-9.99")
                .merchant("Amazon")
                .card("card", "Visa")
                .build(),
            TxBuilder::new(2, date(2024, 2, 1), "-9.99")
                .merchant("AMAZON")
                .card("card", "visa")
                .build(),
            TxBuilder::new(3, date(2024, 1, 5), "-9.99")
                .merchant("Amazon")
                .card("card", "Mastercard")
                .build(),
            TxBuilder::new(4, date(2024, 2, 5), "-9.99")
                .merchant("Amazon")
                .card("card", "Mastercard")
                .build(),
        ];
        let grouping = grouper().group(&dated(&txs)).unwrap();

        assert_eq!(grouping.groups.len(), 2);
        assert_eq!(group_of(&grouping, 1), group_of(&grouping, 2));
        assert_eq!(group_of(&grouping, 3), group_of(&grouping, 4));
        assert_ne!(group_of(&grouping, 1), group_of(&grouping, 3));
        assert!(grouping
            .groups
            .iter()
            .all(|g| g.pass == GroupingPass::MerchantInfo && g.multiplier == 0.85));
    }

    #[test]
    fn test_partner_match_never_reaches_lower_passes() {
        // Tx 1 has an IBAN but no partner sibling; its merchant and description
        // would match txs 2 and 3, yet it must stay out of their groups.
        let txs = vec![
            TxBuilder::new(1, date(2024, 1, 1), "-12.00")
                .partner("DE89370400440532013000", "Gym")
                .merchant("FitGym")
                .description("FITGYM MEMBERSHIP")
                .build(),
            TxBuilder::new(2, date(2024, 2, 1), "-12.00")
                .merchant("FitGym")
                .description("FITGYM MEMBERSHIP")
                .build(),
            TxBuilder::new(3, date(2024, 3, 1), "-12.00")
                .merchant("FitGym")
                .description("FITGYM MEMBERSHIP")
                .build(),
            TxBuilder::new(4, date(2024, 4, 1), "-12.00")
                .description("FITGYM MEMBERSHIP")
                .build(),
        ];
        let grouping = grouper().group(&dated(&txs)).unwrap();

        assert_eq!(group_of(&grouping, 1), None);
        assert_eq!(group_of(&grouping, 2).unwrap().0, GroupingPass::MerchantInfo);
        assert_eq!(group_of(&grouping, 4), None);
    }

    #[test]
    fn test_fuzzy_pass_clusters_similar_descriptions() {
        let txs = vec![
            TxBuilder::new(1, date(2024, 1, 3), "-7.99")
                .description("NETFLIX.COM*12345")
                .build(),
            TxBuilder::new(2, date(2024, 1, 10), "-45.10")
                .description("REWE MARKT 0815")
                .build(),
            TxBuilder::new(3, date(2024, 2, 3), "-7.99")
                .description("Netflix.com 67890")
                .build(),
            TxBuilder::new(4, date(2024, 3, 3), "-7.99")
                .description("NETFLIX PREMIUM")
                .build(),
        ];
        let grouping = grouper().group(&dated(&txs)).unwrap();

        assert_eq!(grouping.groups.len(), 1);
        let group = &grouping.groups[0];
        assert_eq!(group.pass, GroupingPass::DescriptionFuzzy);
        assert_eq!(group.key, "netflix");
        assert_eq!(group.multiplier, 0.65);
        let ids: Vec<i64> = group.members.iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert!(grouping.ungroupable.is_empty());
    }

    #[test]
    fn test_fuzzy_falls_back_to_reference() {
        let txs = vec![
            TxBuilder::new(1, date(2024, 1, 1), "-30.00")
                .description("1234")
                .reference("Miete Wohnung Hauptstr")
                .build(),
            TxBuilder::new(2, date(2024, 2, 1), "-30.00")
                .description("5678")
                .reference("MIETE WOHNUNG HAUPTSTR")
                .build(),
        ];
        let grouping = grouper().group(&dated(&txs)).unwrap();

        assert_eq!(grouping.groups.len(), 1);
        assert_eq!(grouping.groups[0].key, "miete wohnung hauptstr");
    }

    #[test]
    fn test_thin_transaction_is_ungroupable() {
        let txs = vec![
            TxBuilder::new(1, date(2024, 1, 1), "-5.00").description("-").build(),
            TxBuilder::new(2, date(2024, 2, 1), "-5.00").description("ab").build(),
            TxBuilder::new(3, date(2024, 3, 1), "-5.00").description("-").build(),
        ];
        let grouping = grouper().group(&dated(&txs)).unwrap();

        assert!(grouping.groups.is_empty());
        assert_eq!(grouping.ungroupable, vec![1, 2, 3]);
    }

    #[test]
    fn test_groups_are_disjoint() {
        let txs: Vec<Transaction> = (0..12)
            .map(|i| {
                let day = date(2024, 1, 1) + chrono::Duration::days(i * 7);
                let builder = TxBuilder::new(i, day, "-3.50");
                match i % 3 {
                    0 => builder.partner("AT611904300234573201", "Bakery").build(),
                    1 => builder.merchant("Bakery").build(),
                    _ => builder.description("BAKERY SHOP").build(),
                }
            })
            .collect();
        let grouping = grouper().group(&dated(&txs)).unwrap();

        let mut seen = HashSet::new();
        for group in &grouping.groups {
            for member in &group.members {
                assert!(seen.insert(member.id()), "id {} in two groups", member.id());
            }
        }
        assert_eq!(seen.len(), 12);
    }

    #[test]
    fn test_verify_disjoint_flags_overlap() {
        let txs = vec![
            TxBuilder::new(1, date(2024, 1, 1), "-1.00").build(),
            TxBuilder::new(2, date(2024, 2, 1), "-1.00").build(),
        ];
        let members = dated(&txs);
        let groups = vec![
            CandidateGroup {
                pass: GroupingPass::PartnerInfo,
                key: "a".to_string(),
                multiplier: 1.0,
                members: members.clone(),
            },
            CandidateGroup {
                pass: GroupingPass::MerchantInfo,
                key: "b".to_string(),
                multiplier: 0.85,
                members,
            },
        ];
        assert!(matches!(
            verify_disjoint(&groups),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_fuzzy_key_suffix_does_not_depend_on_cluster_order() {
        assert_eq!(fuzzy_key("netflix", "netflix premium", 1), "netflix");
        assert_eq!(fuzzy_key("netflix", "netflix", 2), "netflix");
        assert_eq!(
            fuzzy_key("netflix", "netflix premium", 2),
            "netflix#netflix premium"
        );
        assert_eq!(fuzzy_key("netflix", "netflix hd", 3), "netflix#netflix hd");
    }

    #[test]
    fn test_most_frequent_tie_break() {
        assert_eq!(most_frequent(["b", "a", "b", "a"].into_iter()), Some("a"));
        assert_eq!(most_frequent(["b", "a", "b"].into_iter()), Some("b"));
        assert_eq!(most_frequent(std::iter::empty()), None);
    }
}
