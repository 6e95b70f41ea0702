//! Property-based tests for the signing pipeline's security invariants.
//!
//! 1. Signature round-trip - every built record verifies under the
//!    builder's own public key and under no other
//! 2. Chain linkage - each record's prev_chain_hash equals the computed
//!    chain hash of its predecessor
//! 3. Commit semantics - the chain head advances on build, never rewinds
//! 4. Identifier shape - operation ids are well-formed UUIDv7

use elydora_core::codec::b64u_encode;
use elydora_core::hash;
use elydora_core::{BuilderConfig, OperationBuilder, OperationRequest, SigningKey};
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Strategies for generating test data
// ============================================================================

fn arb_seed() -> impl Strategy<Value = [u8; 32]> {
    any::<[u8; 32]>()
}

fn arb_operation_type() -> impl Strategy<Value = String> {
    "[a-z]{1,10}\\.[a-z]{1,10}"
}

fn arb_payload() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::Value::Null),
        any::<i64>().prop_map(|i| json!({ "n": i })),
        "[a-z ]{0,20}".prop_map(|s| json!({ "text": s, "nested": { "ok": true } })),
    ]
}

fn builder_with_seed(seed: [u8; 32]) -> OperationBuilder {
    OperationBuilder::new(BuilderConfig {
        org_id: "org-test".to_string(),
        agent_id: "agent-test".to_string(),
        private_seed: b64u_encode(seed),
        kid: None,
        ttl_ms: None,
    })
    .unwrap()
}

fn request(operation_type: &str, payload: serde_json::Value) -> OperationRequest {
    OperationRequest {
        operation_type: operation_type.to_string(),
        subject: json!({ "path": "x" }),
        action: json!({ "kind": "test" }),
        payload: Some(payload),
    }
}

// ============================================================================
// Invariant 1: Signature round-trip
// ============================================================================

proptest! {
    #[test]
    fn signatures_verify_under_signing_key(
        seed in arb_seed(),
        message in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let key = SigningKey::from_seed(&seed);
        let signature = key.sign(&message);
        prop_assert!(key.public_key().verify(&message, &signature).is_ok());
    }

    #[test]
    fn signatures_fail_under_other_keys(
        seed_a in arb_seed(),
        seed_b in arb_seed(),
        message in prop::collection::vec(any::<u8>(), 1..128),
    ) {
        prop_assume!(seed_a != seed_b);
        let a = SigningKey::from_seed(&seed_a);
        let b = SigningKey::from_seed(&seed_b);
        let signature = a.sign(&message);
        prop_assert!(b.public_key().verify(&message, &signature).is_err());
    }

    #[test]
    fn built_records_verify(
        seed in arb_seed(),
        op_type in arb_operation_type(),
        payload in arb_payload(),
    ) {
        let builder = builder_with_seed(seed);
        let record = builder.build(request(&op_type, payload)).unwrap();
        prop_assert!(record.verify(&builder.public_key()).is_ok());
    }
}

// ============================================================================
// Invariant 2 & 3: Chain linkage and commit semantics
// ============================================================================

proptest! {
    #[test]
    fn successive_builds_link(count in 2usize..8, seed in arb_seed()) {
        let builder = builder_with_seed(seed);
        let records: Vec<_> = (0..count)
            .map(|i| builder.build(request("chain.step", json!({ "i": i }))).unwrap())
            .collect();

        prop_assert_eq!(&records[0].prev_chain_hash, &hash::genesis_chain_hash());
        for pair in records.windows(2) {
            let expected = hash::chain_hash(
                &pair[0].prev_chain_hash,
                &pair[0].payload_hash,
                &pair[0].operation_id,
                pair[0].issued_at,
            );
            prop_assert_eq!(&pair[1].prev_chain_hash, &expected);
        }

        // The exposed head is the last record's computed chain hash.
        let last = records.last().unwrap();
        let head = hash::chain_hash(
            &last.prev_chain_hash,
            &last.payload_hash,
            &last.operation_id,
            last.issued_at,
        );
        prop_assert_eq!(builder.prev_chain_hash(), head);
    }

    #[test]
    fn head_advances_exactly_once_per_build(seed in arb_seed()) {
        let builder = builder_with_seed(seed);
        let before = builder.prev_chain_hash();
        let record = builder.build(request("step.one", json!(null))).unwrap();
        let after = builder.prev_chain_hash();

        prop_assert_eq!(&record.prev_chain_hash, &before);
        prop_assert_ne!(&after, &before);
        // No further mutation without another build.
        prop_assert_eq!(builder.prev_chain_hash(), after);
    }
}

// ============================================================================
// Invariant 4: Identifier shape
// ============================================================================

proptest! {
    #[test]
    fn operation_ids_are_uuidv7(count in 1usize..16) {
        let builder = builder_with_seed([11u8; 32]);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..count {
            let record = builder.build(request("id.check", json!(null))).unwrap();
            let parsed = uuid::Uuid::parse_str(&record.operation_id).unwrap();
            prop_assert_eq!(parsed.get_version_num(), 7);
            prop_assert_eq!(parsed.as_bytes()[8] >> 6, 0b10);
            prop_assert!(seen.insert(record.operation_id.clone()), "duplicate id");

            // 48-bit prefix tracks the issue timestamp.
            let mut ts: i64 = 0;
            for b in &parsed.as_bytes()[..6] {
                ts = (ts << 8) | i64::from(*b);
            }
            // Generated moments apart inside one build; allow scheduler skew.
            prop_assert!((ts - record.issued_at).abs() <= 1000,
                "uuid timestamp {} vs issued_at {}", ts, record.issued_at);
        }
    }
}
