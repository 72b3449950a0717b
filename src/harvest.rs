// src/harvest.rs

use crate::config::RunConfig;
use crate::error::HarvestError;
use crate::heuristics::{self, PackingRecord, normalize_po};
use crate::pdf_text::{PdfDecoder, document_text};
use crate::portal::{DocumentRef, DocumentSource};
use crate::sheet_store::{KnownPoProvider, RecordSink, StatusTrigger, SubmitPayload};
use crate::slip_db::{DocumentStatus, SlipJournal, SubmissionOutcome};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// What one run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: OffsetDateTime,
    pub documents_seen: usize,
    pub documents_failed: usize,
    pub sections_seen: usize,
    /// Sections where no purchase order could be found.
    pub without_po: usize,
    /// Submitted plus skipped duplicates; this is what the record limit caps.
    pub processed: usize,
    pub submitted: usize,
    pub duplicates: usize,
    pub submit_failures: usize,
    pub limit_reached: bool,
    pub status_update_sent: bool,
}

impl RunReport {
    fn new() -> Self {
        Self {
            started_at: OffsetDateTime::now_utc(),
            documents_seen: 0,
            documents_failed: 0,
            sections_seen: 0,
            without_po: 0,
            processed: 0,
            submitted: 0,
            duplicates: 0,
            submit_failures: 0,
            limit_reached: false,
            status_update_sent: false,
        }
    }
}

/// Run-scoped state threaded through the pipeline.
struct RunContext {
    known: HashSet<String>,
    max_records: usize,
    report: RunReport,
}

impl RunContext {
    fn new(raw_known: Vec<String>, max_records: usize) -> Self {
        Self {
            known: raw_known.iter().map(|po| normalize_po(po)).collect(),
            max_records,
            report: RunReport::new(),
        }
    }

    /// Marks the report as soon as the ceiling is hit.
    fn limit_reached(&mut self) -> bool {
        if self.report.processed >= self.max_records {
            self.report.limit_reached = true;
        }
        self.report.limit_reached
    }
}

/// Sequential scrape-extract-submit pipeline over injected collaborators.
pub struct Harvester {
    source: Box<dyn DocumentSource>,
    decoder: Box<dyn PdfDecoder>,
    known_pos: Arc<dyn KnownPoProvider>,
    sink: Arc<dyn RecordSink>,
    trigger: Arc<dyn StatusTrigger>,
    journal: Option<SlipJournal>,
    max_records: usize,
    submit_delay: Duration,
}

impl Harvester {
    pub fn new<S>(source: Box<dyn DocumentSource>, decoder: Box<dyn PdfDecoder>, store: Arc<S>) -> Self
    where
        S: KnownPoProvider + RecordSink + StatusTrigger + 'static,
    {
        let defaults = RunConfig::default();
        Self {
            source,
            decoder,
            known_pos: store.clone(),
            sink: store.clone(),
            trigger: store,
            journal: None,
            max_records: defaults.max_records,
            submit_delay: defaults.submit_delay(),
        }
    }

    pub fn with_limits(mut self, max_records: usize, submit_delay: Duration) -> Self {
        self.max_records = max_records;
        self.submit_delay = submit_delay;
        self
    }

    pub fn with_run_config(self, run: &RunConfig) -> Self {
        self.with_limits(run.max_records, run.submit_delay())
    }

    pub fn with_journal(mut self, journal: SlipJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn journal(&self) -> Option<&SlipJournal> {
        self.journal.as_ref()
    }

    /// One full pass over the source. Only listing and known-PO failures
    /// abort; everything else is logged and skipped.
    pub async fn run(&self) -> Result<RunReport, HarvestError> {
        let docs = self.source.list().await.map_err(HarvestError::Listing)?;
        if docs.is_empty() {
            warn!("No download links found");
            return Ok(RunReport::new());
        }
        info!(count = docs.len(), "Found pack-slips");

        let known = self
            .known_pos
            .known_purchase_orders()
            .await
            .map_err(HarvestError::KnownPurchaseOrders)?;
        let mut ctx = RunContext::new(known, self.max_records);

        for doc in &docs {
            if ctx.limit_reached() {
                break;
            }
            let span = info_span!("document", location = %doc.location);
            self.process_document(doc, &mut ctx).instrument(span).await;
        }

        info!("Triggering PO status update");
        match self.trigger.trigger_update().await {
            Ok(()) => ctx.report.status_update_sent = true,
            Err(e) => error!(error = %e, "Status update trigger failed"),
        }

        let report = ctx.report;
        let elapsed = OffsetDateTime::now_utc() - report.started_at;
        info!(
            documents = report.documents_seen,
            documents_failed = report.documents_failed,
            sections = report.sections_seen,
            processed = report.processed,
            submitted = report.submitted,
            duplicates = report.duplicates,
            submit_failures = report.submit_failures,
            limit_reached = report.limit_reached,
            elapsed_ms = elapsed.whole_milliseconds() as i64,
            "Run complete"
        );
        Ok(report)
    }

    async fn process_document(&self, doc: &DocumentRef, ctx: &mut RunContext) {
        ctx.report.documents_seen += 1;

        let bytes = match self.source.fetch(doc).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "PDF fetch failed");
                ctx.report.documents_failed += 1;
                self.journal_document(doc, DocumentStatus::Error, 0, None, Some(&e.to_string()));
                return;
            }
        };

        let pages = match self.decoder.decode(&bytes) {
            Ok(pages) => pages,
            Err(e) => {
                error!(error = %e, "PDF decode failed");
                ctx.report.documents_failed += 1;
                self.journal_document(doc, DocumentStatus::Error, 0, None, Some(&e.to_string()));
                return;
            }
        };

        let text = document_text(&pages);
        let doc_uid =
            self.journal_document(doc, DocumentStatus::Text, pages.len(), Some(&text), None);

        let mut sections = 0;
        for section in heuristics::split_sections(&text) {
            if ctx.limit_reached() {
                break;
            }
            if section.trim().is_empty() {
                continue;
            }
            sections += 1;
            ctx.report.sections_seen += 1;

            let record = heuristics::extract_record(section);
            self.handle_record(&record, doc_uid.as_deref(), ctx).await;
        }
        info!(sections, pages = pages.len(), "Document done");
    }

    async fn handle_record(
        &self,
        record: &PackingRecord,
        doc_uid: Option<&str>,
        ctx: &mut RunContext,
    ) {
        let payload = SubmitPayload::from(record);
        let (filled, total) = record.coverage();

        if payload.purchase_order.is_empty() {
            debug!(filled, total, "Section has no purchase order");
            ctx.report.without_po += 1;
            return;
        }

        ctx.report.processed += 1;

        if ctx.known.contains(&payload.purchase_order) {
            info!(po = %payload.purchase_order, "Skipped duplicate PO");
            ctx.report.duplicates += 1;
            self.journal_submission(doc_uid, &payload, SubmissionOutcome::Duplicate, None);
            return;
        }

        info!(
            po = %payload.purchase_order,
            items = %payload.item_number,
            quantities = %payload.quantity,
            date = %payload.order_date,
            filled,
            total,
            "New PO, sending"
        );

        tokio::time::sleep(self.submit_delay).await;

        match self.sink.submit(&payload).await {
            Ok(()) => {
                info!(po = %payload.purchase_order, "Submitted PO");
                ctx.report.submitted += 1;
                self.journal_submission(doc_uid, &payload, SubmissionOutcome::Submitted, None);
            }
            Err(e) => {
                error!(po = %payload.purchase_order, error = %e, "POST failed");
                ctx.report.submit_failures += 1;
                let err = e.to_string();
                self.journal_submission(doc_uid, &payload, SubmissionOutcome::Failed, Some(&err));
            }
        }
    }

    fn journal_document(
        &self,
        doc: &DocumentRef,
        status: DocumentStatus,
        pages: usize,
        text: Option<&str>,
        err: Option<&str>,
    ) -> Option<String> {
        let journal = self.journal.as_ref()?;
        match journal.record_document(&doc.location, status, pages, text, err) {
            Ok(uid) => Some(uid),
            Err(e) => {
                warn!(error = %e, "Journal write failed");
                None
            }
        }
    }

    fn journal_submission(
        &self,
        doc_uid: Option<&str>,
        payload: &SubmitPayload,
        outcome: SubmissionOutcome,
        err: Option<&str>,
    ) {
        let (Some(journal), Some(uid)) = (self.journal.as_ref(), doc_uid) else {
            return;
        };
        if let Err(e) = journal.record_submission(uid, payload, outcome, err) {
            warn!(error = %e, "Journal write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeError, SourceError, StoreError};
    use crate::pdf_text::PageText;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Documents are served by name; `None` bytes make the fetch fail.
    struct FakeSource {
        docs: Vec<(String, Option<String>)>,
    }

    #[async_trait]
    impl DocumentSource for FakeSource {
        async fn list(&self) -> Result<Vec<DocumentRef>, SourceError> {
            Ok(self
                .docs
                .iter()
                .map(|(name, _)| DocumentRef {
                    location: name.clone(),
                })
                .collect())
        }

        async fn fetch(&self, doc: &DocumentRef) -> Result<Vec<u8>, SourceError> {
            self.docs
                .iter()
                .find(|(name, _)| *name == doc.location)
                .and_then(|(_, body)| body.clone())
                .map(String::into_bytes)
                .ok_or_else(|| SourceError::NotPdf("text/html".into()))
        }
    }

    /// Treats the bytes as text; the literal `corrupt` fails to decode.
    struct FakeDecoder;

    impl PdfDecoder for FakeDecoder {
        fn decode(&self, pdf_bytes: &[u8]) -> Result<Vec<PageText>, DecodeError> {
            let text = String::from_utf8_lossy(pdf_bytes);
            if text == "corrupt" {
                return Err(DecodeError::Parse("bad xref".into()));
            }
            Ok(vec![PageText::from_text(&text)])
        }
    }

    #[derive(Default)]
    struct FakeStore {
        known: Option<Vec<String>>,
        reject_po: Option<String>,
        submitted: Mutex<Vec<SubmitPayload>>,
        triggers: AtomicUsize,
    }

    impl FakeStore {
        fn knowing(pos: &[&str]) -> Self {
            Self {
                known: Some(pos.iter().map(|p| p.to_string()).collect()),
                ..Default::default()
            }
        }

        fn submitted_pos(&self) -> Vec<String> {
            self.submitted
                .lock()
                .unwrap()
                .iter()
                .map(|p| p.purchase_order.clone())
                .collect()
        }
    }

    #[async_trait]
    impl KnownPoProvider for FakeStore {
        async fn known_purchase_orders(&self) -> Result<Vec<String>, StoreError> {
            self.known
                .clone()
                .ok_or_else(|| StoreError::Payload("script offline".into()))
        }
    }

    #[async_trait]
    impl RecordSink for FakeStore {
        async fn submit(&self, payload: &SubmitPayload) -> Result<(), StoreError> {
            if self.reject_po.as_deref() == Some(payload.purchase_order.as_str()) {
                return Err(StoreError::Payload("quota".into()));
            }
            self.submitted.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl StatusTrigger for FakeStore {
        async fn trigger_update(&self) -> Result<(), StoreError> {
            self.triggers.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn slip(po: &str, item_line: &str) -> String {
        format!(
            "PACKING LIST\nShip To:\nDEPOT 9\n{po}\n03/14/2024\nCostco Item\nDescription\n{item_line}\nWIDGET\n"
        )
    }

    fn harvester(docs: Vec<(&str, Option<String>)>, store: &Arc<FakeStore>) -> Harvester {
        let source = FakeSource {
            docs: docs.into_iter().map(|(n, b)| (n.to_string(), b)).collect(),
        };
        Harvester::new(Box::new(source), Box::new(FakeDecoder), store.clone())
            .with_limits(300, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_submits_new_and_skips_known() {
        let store = Arc::new(FakeStore::knowing(&["123456789"]));
        let text = format!(
            "{}{}",
            slip("000123456789", "11464583"),
            slip("555566667777", "21464589")
        );
        let report = harvester(vec![("a.pdf", Some(text))], &store)
            .run()
            .await
            .unwrap();

        assert_eq!(report.sections_seen, 2);
        assert_eq!(report.processed, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.submitted, 1);
        assert!(report.status_update_sent);

        let sent = store.submitted.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![SubmitPayload {
                purchase_order: "555566667777".into(),
                item_number: "1464589".into(),
                order_date: "03/14/2024".into(),
                province: String::new(),
                quantity: "2".into(),
                ship_to: "DEPOT 9".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent_against_known_pos() {
        let text = slip("0042424242", "11464583");
        let store = Arc::new(FakeStore::knowing(&["42424242"]));
        let report = harvester(vec![("a.pdf", Some(text))], &store)
            .run()
            .await
            .unwrap();

        assert_eq!(report.submitted, 0);
        assert_eq!(report.processed, 1);
        assert!(store.submitted_pos().is_empty());
        assert_eq!(store.triggers.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_known_po_failure_aborts_run() {
        let store = Arc::new(FakeStore::default());
        let result = harvester(vec![("a.pdf", Some(slip("12345678", "11464583")))], &store)
            .run()
            .await;

        assert!(matches!(result, Err(HarvestError::KnownPurchaseOrders(_))));
        assert!(store.submitted_pos().is_empty());
        assert_eq!(store.triggers.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bad_documents_are_skipped() {
        let store = Arc::new(FakeStore::knowing(&[]));
        let docs = vec![
            ("missing.pdf", None),
            ("corrupt.pdf", Some("corrupt".to_string())),
            ("good.pdf", Some(slip("87654321", "11464583"))),
        ];
        let report = harvester(docs, &store).run().await.unwrap();

        assert_eq!(report.documents_seen, 3);
        assert_eq!(report.documents_failed, 2);
        assert_eq!(store.submitted_pos(), vec!["87654321"]);
    }

    #[tokio::test]
    async fn test_record_limit_stops_early() {
        let store = Arc::new(FakeStore::knowing(&[]));
        let first = format!("{}{}", slip("11111111", "11464583"), slip("22222222", "11464583"));
        let docs = vec![
            ("a.pdf", Some(first)),
            ("b.pdf", Some(slip("33333333", "11464583"))),
        ];
        let report = harvester(docs, &store)
            .with_limits(2, Duration::ZERO)
            .run()
            .await
            .unwrap();

        assert_eq!(store.submitted_pos(), vec!["11111111", "22222222"]);
        assert_eq!(report.processed, 2);
        assert_eq!(report.documents_seen, 1);
        assert!(report.limit_reached);
        assert!(report.status_update_sent);
    }

    #[tokio::test]
    async fn test_duplicates_count_toward_limit() {
        let store = Arc::new(FakeStore::knowing(&["11111111"]));
        let text = format!("{}{}", slip("11111111", "11464583"), slip("22222222", "11464583"));
        let report = harvester(vec![("a.pdf", Some(text))], &store)
            .with_limits(1, Duration::ZERO)
            .run()
            .await
            .unwrap();

        assert_eq!(report.duplicates, 1);
        assert!(store.submitted_pos().is_empty());
        assert!(report.limit_reached);
    }

    #[tokio::test]
    async fn test_submit_failure_moves_on() {
        let store = Arc::new(FakeStore {
            known: Some(Vec::new()),
            reject_po: Some("11111111".into()),
            ..Default::default()
        });
        let text = format!("{}{}", slip("11111111", "11464583"), slip("22222222", "11464583"));
        let report = harvester(vec![("a.pdf", Some(text))], &store)
            .run()
            .await
            .unwrap();

        assert_eq!(report.submit_failures, 1);
        assert_eq!(report.submitted, 1);
        assert_eq!(report.processed, 2);
        assert_eq!(store.submitted_pos(), vec!["22222222"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_only_before_new_submissions() {
        let store = Arc::new(FakeStore::knowing(&["11111111"]));
        let text = format!(
            "{}{}PACKING LIST\nno order number here\n{}{}",
            slip("11111111", "11464583"),
            slip("22222222", "11464583"),
            slip("0011111111", "21464589"),
            slip("33333333", "11464583"),
        );
        let delay = Duration::from_millis(1000);
        let harvester = harvester(vec![("a.pdf", Some(text))], &store).with_limits(300, delay);

        let start = tokio::time::Instant::now();
        let report = harvester.run().await.unwrap();

        assert_eq!(report.submitted, 2);
        assert_eq!(report.duplicates, 2);
        assert_eq!(report.without_po, 1);
        assert_eq!(start.elapsed(), delay * 2);
    }

    #[tokio::test]
    async fn test_section_without_po_is_not_submitted() {
        let store = Arc::new(FakeStore::knowing(&[]));
        let text = "PACKING LIST\nPO 1234567\nDescription\n1\n1464583\n".to_string();
        let report = harvester(vec![("a.pdf", Some(text))], &store)
            .run()
            .await
            .unwrap();

        assert_eq!(report.sections_seen, 1);
        assert_eq!(report.without_po, 1);
        assert_eq!(report.processed, 0);
        assert!(store.submitted_pos().is_empty());
    }

    #[tokio::test]
    async fn test_empty_listing_ends_without_trigger() {
        let store = Arc::new(FakeStore::knowing(&[]));
        let report = harvester(Vec::new(), &store).run().await.unwrap();

        assert_eq!(report.documents_seen, 0);
        assert!(!report.status_update_sent);
        assert_eq!(store.triggers.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_journal_records_run() {
        let store = Arc::new(FakeStore::knowing(&["11111111"]));
        let text = format!("{}{}", slip("11111111", "11464583"), slip("22222222", "11464583"));
        let docs = vec![("a.pdf", Some(text)), ("gone.pdf", None)];
        let harvester = harvester(docs, &store).with_journal(SlipJournal::in_memory().unwrap());
        harvester.run().await.unwrap();

        let journal = harvester.journal().unwrap();
        let counts = journal.counts().unwrap();
        assert_eq!(counts.documents, 2);
        assert_eq!(counts.failed_documents, 1);
        assert_eq!(counts.submitted, 1);
        assert_eq!(counts.duplicates, 1);

        let rows = journal
            .submissions_for(&SlipJournal::document_uid("a.pdf"))
            .unwrap();
        assert_eq!(rows[1].purchase_order, "22222222");
        assert_eq!(rows[1].item_number, "1464583");
    }
}
