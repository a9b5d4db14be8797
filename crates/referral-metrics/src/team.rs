//! Team size aggregation over an in-memory partner population.

use referral_common::Partner;
use std::collections::{HashMap, HashSet};

enum Step<'a> {
    Enter(&'a str),
    Exit(&'a str),
}

/// Number of partners below `root` at every depth.
///
/// Each team entry counts once. Recruits of a partner are only followed if
/// that partner is not already on the current path, so a cycle adds the
/// repeated entry itself and nothing beneath it. A recruit with no record
/// counts but has no descendants.
#[must_use]
pub fn total_team_size(root: &Partner, partners: &HashMap<String, Partner>) -> u64 {
    let mut on_path: HashSet<&str> = HashSet::from([root.id.as_str()]);
    let mut stack: Vec<Step<'_>> = root.valid_team().rev().map(Step::Enter).collect();
    let mut total = 0u64;

    while let Some(step) = stack.pop() {
        match step {
            Step::Exit(id) => {
                on_path.remove(id);
            }
            Step::Enter(id) => {
                total += 1;
                if on_path.contains(id) {
                    continue;
                }
                let Some(partner) = partners.get(id) else {
                    continue;
                };
                on_path.insert(id);
                stack.push(Step::Exit(id));
                stack.extend(partner.valid_team().rev().map(Step::Enter));
            }
        }
    }

    total
}
