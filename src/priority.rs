//! Display ordering for repositories and pipelines.
//!
//! Both comparators are total: the final stage compares identity keys, so
//! two distinct entities never compare equal and sort output does not depend
//! on input order.

use std::cmp::Ordering;

use crate::model::{Pipeline, Repository};

fn success_rate(repo: &Repository) -> Option<f64> {
    repo.recent_success_rate.filter(|r| r.is_finite())
}

/// Present rates ascending (worst first), then absent.
fn cmp_rate(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn compare_repositories(a: &Repository, b: &Repository) -> Ordering {
    // `true` first: compare b against a.
    b.runner_issue()
        .cmp(&a.runner_issue())
        .then_with(|| b.consecutive_failures().cmp(&a.consecutive_failures()))
        .then_with(|| b.failing_jobs().cmp(&a.failing_jobs()))
        .then_with(|| cmp_rate(success_rate(a), success_rate(b)))
        .then_with(|| a.status().rank().cmp(&b.status().rank()))
        .then_with(|| {
            a.display_name()
                .to_lowercase()
                .cmp(&b.display_name().to_lowercase())
        })
        .then_with(|| a.key().cmp(&b.key()))
}

pub fn sort_repositories(repos: &mut [Repository]) {
    repos.sort_by(compare_repositories);
}

/// Status rank, then newest first. Pipelines without a parseable creation
/// time sort after dated ones within the same status.
pub fn compare_pipelines(a: &Pipeline, b: &Pipeline) -> Ordering {
    a.status()
        .rank()
        .cmp(&b.status().rank())
        .then_with(|| match (a.created(), b.created()) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.key().cmp(&b.key()))
}

pub fn sort_pipelines(pipelines: &mut [Pipeline]) {
    pipelines.sort_by(compare_pipelines);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(id: u64, name: &str) -> Repository {
        Repository {
            id: Some(id),
            name: Some(name.to_string()),
            last_pipeline_status: Some("success".into()),
            ..Default::default()
        }
    }

    fn names(repos: &[Repository]) -> Vec<String> {
        repos.iter().map(|r| r.display_name()).collect()
    }

    #[test]
    fn test_stage_order() {
        let mut runner = repo(1, "zeta");
        runner.has_runner_issues = Some(true);
        let mut failing3 = repo(2, "yak");
        failing3.consecutive_default_branch_failures = Some(3);
        let mut failing1 = repo(3, "xray");
        failing1.consecutive_default_branch_failures = Some(1);
        let mut jobs = repo(4, "whale");
        jobs.has_failing_jobs = Some(true);
        let mut low_rate = repo(5, "vole");
        low_rate.recent_success_rate = Some(0.4);
        let mut high_rate = repo(6, "urchin");
        high_rate.recent_success_rate = Some(0.9);
        let mut running = repo(7, "tapir");
        running.last_pipeline_status = Some("running".into());
        let plain_b = repo(8, "Beta");
        let plain_a = repo(9, "alpha");

        let mut all = vec![
            plain_b, high_rate, jobs, plain_a, running, failing1, low_rate, runner, failing3,
        ];
        sort_repositories(&mut all);
        assert_eq!(
            names(&all),
            vec!["zeta", "yak", "xray", "whale", "vole", "urchin", "tapir", "alpha", "Beta"]
        );
    }

    #[test]
    fn test_rate_present_beats_absent() {
        let mut with_rate = repo(1, "zzz");
        with_rate.recent_success_rate = Some(0.5);
        let without = repo(2, "aaa");
        let mut v = vec![without, with_rate];
        sort_repositories(&mut v);
        assert_eq!(names(&v), vec!["zzz", "aaa"]);
    }

    #[test]
    fn test_sort_is_total_and_order_independent() {
        let mut v: Vec<Repository> = (0..12)
            .map(|i| {
                let mut r = repo(i, if i % 2 == 0 { "same" } else { "Same" });
                r.recent_success_rate = if i % 3 == 0 { None } else { Some(0.5) };
                r.consecutive_default_branch_failures = Some(i % 2);
                r
            })
            .collect();
        let mut reversed: Vec<Repository> = v.iter().rev().cloned().collect();
        sort_repositories(&mut v);
        let once = v.clone();
        sort_repositories(&mut v);
        sort_repositories(&mut reversed);
        assert_eq!(once, v);
        assert_eq!(once, reversed);
    }

    #[test]
    fn test_pipeline_order() {
        let p = |id: u64, status: &str, created: &str| Pipeline {
            id: Some(id),
            status: Some(status.into()),
            created_at: Some(created.into()),
            ..Default::default()
        };
        let mut v = vec![
            p(1, "success", "2024-05-01T10:00:00Z"),
            p(2, "failed", "2024-05-01T09:00:00Z"),
            p(3, "failed", "2024-05-01T11:00:00Z"),
            p(4, "running", "2024-05-01T08:00:00Z"),
        ];
        sort_pipelines(&mut v);
        let ids: Vec<u64> = v.iter().filter_map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 2, 4, 1]);
    }
}
