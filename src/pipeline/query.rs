use crate::core::error::TriageError;
use crate::core::store::IncidentStore;
use crate::core::types::{Incident, IncidentFilter, IncidentSort, Page, StoreStats};

const DEFAULT_CHUNK: u32 = 100;

/// Read-only composed view over the store for the triage dashboard.
/// Filtering, sorting, and aggregation are query-time concerns; nothing
/// here mutates stored incidents.
pub struct DashboardQuery<'a> {
    store: &'a IncidentStore,
}

impl<'a> DashboardQuery<'a> {
    pub fn new(store: &'a IncidentStore) -> Self {
        Self { store }
    }

    pub fn list(
        &self,
        filter: &IncidentFilter,
        sort: IncidentSort,
        page: &Page,
    ) -> Result<Vec<Incident>, TriageError> {
        self.store.list(filter, sort, page)
    }

    /// Lazily paged sequence over the matching incidents. Each call starts
    /// a fresh pass; the store holds no per-client cursor.
    pub fn iter(
        &self,
        filter: IncidentFilter,
        sort: IncidentSort,
        chunk: u32,
    ) -> IncidentPages<'a> {
        IncidentPages {
            store: self.store,
            filter,
            sort,
            chunk: if chunk == 0 { DEFAULT_CHUNK } else { chunk },
            offset: 0,
            buffer: Vec::new(),
            done: false,
        }
    }

    pub fn stats(&self, high_cutoff: f64) -> Result<StoreStats, TriageError> {
        self.store.stats(high_cutoff)
    }
}

pub struct IncidentPages<'a> {
    store: &'a IncidentStore,
    filter: IncidentFilter,
    sort: IncidentSort,
    chunk: u32,
    offset: u32,
    buffer: Vec<Incident>,
    done: bool,
}

impl Iterator for IncidentPages<'_> {
    type Item = Result<Incident, TriageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            let page = Page {
                limit: Some(self.chunk),
                offset: self.offset,
            };
            match self.store.list(&self.filter, self.sort, &page) {
                Ok(batch) => {
                    if (batch.len() as u32) < self.chunk {
                        self.done = true;
                    }
                    self.offset += batch.len() as u32;
                    // Pop from the back; reverse to keep query order.
                    self.buffer = batch;
                    self.buffer.reverse();
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        self.buffer.pop().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use chrono::Utc;

    use crate::core::types::{
        Category, Classification, EvidenceBundle, EvidenceKind, NewIncident, SignalSet,
    };

    fn seed(store: &mut IncidentStore, count: usize) {
        let now: DateTime<Utc> = "2026-02-01T12:00:00Z".parse().unwrap();
        for i in 0..count {
            store
                .create(
                    NewIncident {
                        reporter_id: format!("rep-{}", i),
                        channel: "incident-portal".to_string(),
                        evidence: EvidenceBundle {
                            kinds: vec![EvidenceKind::Description],
                            text_content: Some("seed".to_string()),
                            url: None,
                            file: None,
                            submitted_at: now,
                            reporter_id: format!("rep-{}", i),
                        },
                        signals: SignalSet::new(),
                        classification: Classification {
                            category: Category::Phishing,
                            confidence: 0.5,
                            signals_used: vec![],
                            rationale: "seed".to_string(),
                        },
                        priority_score: (i % 10) as f64,
                    },
                    now + chrono::Duration::seconds(i as i64),
                )
                .unwrap();
        }
    }

    #[test]
    fn paged_iteration_matches_one_shot_listing() {
        let mut store = IncidentStore::open_in_memory().unwrap();
        seed(&mut store, 25);
        let query = DashboardQuery::new(&store);

        let all = query
            .list(
                &IncidentFilter::default(),
                IncidentSort::PriorityDesc,
                &Page::default(),
            )
            .unwrap();
        let paged: Vec<Incident> = query
            .iter(IncidentFilter::default(), IncidentSort::PriorityDesc, 7)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(all.len(), 25);
        let all_ids: Vec<&str> = all.iter().map(|i| i.id.as_str()).collect();
        let paged_ids: Vec<&str> = paged.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(all_ids, paged_ids);
    }

    #[test]
    fn iteration_is_restartable() {
        let mut store = IncidentStore::open_in_memory().unwrap();
        seed(&mut store, 5);
        let query = DashboardQuery::new(&store);

        let first: Vec<String> = query
            .iter(IncidentFilter::default(), IncidentSort::CreatedDesc, 2)
            .map(|r| r.unwrap().id)
            .collect();
        let second: Vec<String> = query
            .iter(IncidentFilter::default(), IncidentSort::CreatedDesc, 2)
            .map(|r| r.unwrap().id)
            .collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }
}
