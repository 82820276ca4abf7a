//! Fast non-dominated sorting and crowding distance.
//!
//! # Reference
//! Deb et al. (2002), "A Fast and Elitist Multiobjective Genetic
//! Algorithm: NSGA-II", IEEE TEC 6(2)

use crate::models::{Objective, ObjectiveVector};

/// Partitions `0..n` into successive fronts under a dominance relation.
///
/// Front 0 holds the indices no other index dominates; front i+1 holds
/// those dominated only by members of fronts ≤ i. O(n²) comparisons.
pub fn fast_non_dominated_sort<F>(n: usize, dominates: F) -> Vec<Vec<usize>>
where
    F: Fn(usize, usize) -> bool,
{
    let mut dominated_by_me: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut domination_count = vec![0usize; n];
    let mut fronts: Vec<Vec<usize>> = Vec::new();
    let mut current = Vec::new();

    for p in 0..n {
        for q in 0..n {
            if p == q {
                continue;
            }
            if dominates(p, q) {
                dominated_by_me[p].push(q);
            } else if dominates(q, p) {
                domination_count[p] += 1;
            }
        }
        if domination_count[p] == 0 {
            current.push(p);
        }
    }

    while !current.is_empty() {
        let mut next = Vec::new();
        for &p in &current {
            for &q in &dominated_by_me[p] {
                domination_count[q] -= 1;
                if domination_count[q] == 0 {
                    next.push(q);
                }
            }
        }
        next.sort_unstable();
        fronts.push(current);
        current = next;
    }
    fronts
}

/// Sorts objective vectors by plain Pareto dominance.
pub fn non_dominated_sort(objectives: &[ObjectiveVector]) -> Vec<Vec<usize>> {
    fast_non_dominated_sort(objectives.len(), |a, b| {
        objectives[a].dominates(&objectives[b])
    })
}

/// Constrained dominance: smaller total violation wins; equal violation
/// falls back to Pareto dominance on the objectives.
pub fn constrained_dominates(
    a: &ObjectiveVector,
    violation_a: f64,
    b: &ObjectiveVector,
    violation_b: f64,
) -> bool {
    if violation_a < violation_b {
        true
    } else if violation_a > violation_b {
        false
    } else {
        a.dominates(b)
    }
}

/// Sorts by constrained dominance. Every front's members share one
/// violation value or are mutually non-dominated in objective space.
pub fn constrained_non_dominated_sort(
    objectives: &[ObjectiveVector],
    violations: &[f64],
) -> Vec<Vec<usize>> {
    fast_non_dominated_sort(objectives.len(), |a, b| {
        constrained_dominates(&objectives[a], violations[a], &objectives[b], violations[b])
    })
}

/// Crowding distance of each member of `front` (aligned with `front`).
///
/// Sum over objectives of the normalized gap between a member's two
/// neighbors; the boundary members of every objective that varies across
/// the front get `f64::INFINITY`. Fronts of one or two members are all
/// boundary.
pub fn crowding_distance(objectives: &[ObjectiveVector], front: &[usize]) -> Vec<f64> {
    let n = front.len();
    let mut distance = vec![0.0; n];
    if n <= 2 {
        return vec![f64::INFINITY; n];
    }

    let mut order: Vec<usize> = (0..n).collect();
    for objective in Objective::ALL {
        let value = |i: usize| objectives[front[i]].get(objective);
        order.sort_by(|&a, &b| value(a).total_cmp(&value(b)));

        let range = value(order[n - 1]) - value(order[0]);
        if range <= 0.0 {
            continue;
        }
        distance[order[0]] = f64::INFINITY;
        distance[order[n - 1]] = f64::INFINITY;
        for k in 1..n - 1 {
            let gap = value(order[k + 1]) - value(order[k - 1]);
            distance[order[k]] += gap / range;
        }
    }
    distance
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(y: f64, c: f64, e: f64, r: f64) -> ObjectiveVector {
        ObjectiveVector::new(y, c, e, r)
    }

    #[test]
    fn test_sort_layers() {
        let objs = vec![
            v(90.0, 50.0, 50.0, 50.0), // 0: front 0
            v(50.0, 90.0, 50.0, 50.0), // 1: front 0
            v(80.0, 40.0, 40.0, 40.0), // 2: dominated by 0
            v(70.0, 30.0, 30.0, 30.0), // 3: dominated by 0, 2
            v(50.0, 90.0, 50.0, 50.0), // 4: duplicate of 1, front 0
        ];
        let fronts = non_dominated_sort(&objs);
        assert_eq!(fronts, vec![vec![0, 1, 4], vec![2], vec![3]]);
    }

    #[test]
    fn test_sort_empty() {
        assert!(non_dominated_sort(&[]).is_empty());
    }

    #[test]
    fn test_constrained_feasible_first() {
        let objs = vec![v(99.0, 99.0, 99.0, 99.0), v(10.0, 10.0, 10.0, 10.0)];
        let fronts = constrained_non_dominated_sort(&objs, &[5.0, 0.0]);
        assert_eq!(fronts, vec![vec![1], vec![0]]);
    }

    #[test]
    fn test_crowding_boundaries_infinite() {
        let objs = vec![
            v(10.0, 90.0, 50.0, 50.0),
            v(50.0, 50.0, 50.0, 50.0),
            v(90.0, 10.0, 50.0, 50.0),
            v(60.0, 40.0, 50.0, 50.0),
        ];
        let front = vec![0, 1, 2, 3];
        let d = crowding_distance(&objs, &front);
        assert!(d[0].is_infinite());
        assert!(d[2].is_infinite());
        // Member 1 sits between 0 and 3 on both varying axes: 2 × 50/80.
        assert!((d[1] - 1.25).abs() < 1e-12);
        assert!((d[3] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_crowding_small_fronts() {
        let objs = vec![v(1.0, 2.0, 3.0, 4.0), v(4.0, 3.0, 2.0, 1.0)];
        assert_eq!(crowding_distance(&objs, &[0, 1]), vec![f64::INFINITY; 2]);
        assert!(crowding_distance(&objs, &[]).is_empty());
    }

    fn arb_vector() -> impl Strategy<Value = ObjectiveVector> {
        (0u8..=10, 0u8..=10, 0u8..=10, 0u8..=10).prop_map(|(a, b, c, d)| {
            v(f64::from(a) * 10.0, f64::from(b) * 10.0, f64::from(c) * 10.0, f64::from(d) * 10.0)
        })
    }

    proptest! {
        #[test]
        fn prop_fronts_partition_and_layer(objs in prop::collection::vec(arb_vector(), 0..40)) {
            let fronts = non_dominated_sort(&objs);

            let mut seen: Vec<usize> = fronts.iter().flatten().copied().collect();
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..objs.len()).collect::<Vec<_>>());

            for front in &fronts {
                for &a in front {
                    for &b in front {
                        prop_assert!(!objs[a].dominates(&objs[b]));
                    }
                }
            }
            for pair in fronts.windows(2) {
                for &q in &pair[1] {
                    prop_assert!(pair[0].iter().any(|&p| objs[p].dominates(&objs[q])));
                }
            }
        }

        #[test]
        fn prop_crowding_non_negative(objs in prop::collection::vec(arb_vector(), 1..30)) {
            let front: Vec<usize> = (0..objs.len()).collect();
            for d in crowding_distance(&objs, &front) {
                prop_assert!(d >= 0.0);
            }
        }
    }
}
