//! Property-style check: routing is a pure function of (rules, last text).
//!
//! Rule sets and last-step texts are generated from a small seeded PRNG so
//! the test is reproducible without a property-testing dependency.


use ensemble::{team_from_yaml, HandoffRouter};

/// Minimal deterministic PRNG (xorshift64*), enough to shuffle fixtures.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[(self.next() as usize) % items.len()]
    }
}

const AGENTS: [&str; 4] = ["consultant", "researcher", "writer", "reviewer"];

const PHRASES: [&str; 8] = [
    "requirements are clear, research should begin",
    "comprehensive research complete, ready for review",
    "research sufficient, ready for writing",
    "section draft complete, needs review",
    "review complete and approved, continue writing",
    "more research needed on safety statistics",
    "nothing conclusive yet, still working",
    "final report compiled. TERMINATE",
];

fn random_team_yaml(rng: &mut Rng) -> String {
    let mut yaml = String::from("name: generated\nagents:\n");
    for agent in AGENTS {
        yaml.push_str(&format!("  - name: {}\n    prompt_template: p\n", agent));
    }

    let conditions = [
        "research",
        "review",
        "writing",
        "/draft (complete|finished)/",
        "approved",
    ];
    let n_rules = (rng.next() % 5) as usize;
    if n_rules > 0 {
        yaml.push_str("handoffs:\n");
        for _ in 0..n_rules {
            let from = rng.pick(&AGENTS);
            let to = rng.pick(&AGENTS);
            yaml.push_str(&format!("  - from: {}\n    to: {}\n", from, to));
            if rng.next() % 2 == 0 {
                yaml.push_str(&format!("    condition: \"{}\"\n", rng.pick(&conditions)));
            }
        }
    }

    let patterns = [
        ("need(s)?\\\\s+review", "reviewer"),
        ("ready\\\\s+for\\\\s+writing", "writer"),
        ("research\\\\s+(should|needed)", "researcher"),
    ];
    let n_patterns = (rng.next() % 4) as usize;
    if n_patterns > 0 {
        yaml.push_str("handoff_patterns:\n");
        for _ in 0..n_patterns {
            let (pattern, to) = *rng.pick(&patterns);
            yaml.push_str(&format!("  - pattern: \"{}\"\n    to: {}\n", pattern, to));
        }
    }
    yaml
}

/// **Scenario**: for 200 generated (rule set, current agent, text) triples,
/// two independently compiled routers agree, and repeated calls on one
/// router never change their answer.
#[test]
fn generated_rule_sets_route_deterministically() {
    let mut rng = Rng(0x5EED_1234_5678_9ABC);
    for case in 0..200 {
        let yaml = random_team_yaml(&mut rng);
        let team_a = team_from_yaml(&yaml).unwrap();
        let team_b = team_from_yaml(&yaml).unwrap();
        let router_a = HandoffRouter::from_team(&team_a);
        let router_b = HandoffRouter::from_team(&team_b);

        let current = *rng.pick(&AGENTS);
        let text = *rng.pick(&PHRASES);

        let first = router_a.next(current, text).unwrap();
        let other = router_b.next(current, text).unwrap();
        assert_eq!(first, other, "case {}: routers disagree for {:?}", case, yaml);
        for _ in 0..10 {
            assert_eq!(
                router_a.next(current, text).unwrap(),
                first,
                "case {}: unstable routing",
                case
            );
        }
    }
}

/// **Scenario**: declaration order breaks ties: two rules from the same
/// agent that both fire always resolve to the first one.
#[test]
fn declaration_order_breaks_ties() {
    let team = team_from_yaml(
        r#"
name: tie
agents:
  - name: a
    prompt_template: p
  - name: b
    prompt_template: p
  - name: c
    prompt_template: p
handoffs:
  - from: a
    to: b
    condition: done
  - from: a
    to: c
    condition: done
"#,
    )
    .unwrap();
    let router = HandoffRouter::from_team(&team);
    for _ in 0..20 {
        assert_eq!(
            router.next("a", "work is done").unwrap(),
            ensemble::Route::Agent("b".into())
        );
    }
}
