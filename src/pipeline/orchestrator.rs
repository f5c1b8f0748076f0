//! Per-unit pipeline: one extraction call, four correction passes, one merge.
//!
//! ```text
//! Init ──upload──▶ Extracting ──▶ Correcting ──▶ Merging ──▶ Done
//!   │                  │                            │
//!   └──▶ Failed ◀──────┘ (empty / unusable reply)   └──▶ Failed
//!                       every path past upload ──▶ Cleanup (release)
//! ```
//!
//! All five calls run sequentially on the unit's own [`Conversation`]. A
//! failed correction pass degrades to "no corrections"; a failed base
//! extraction ends the unit without issuing any correction. Whatever happens
//! after a successful upload, the attachment is released before the unit
//! reports back.

use crate::config::ExtractionConfig;
use crate::error::UnitError;
use crate::output::UnitResult;
use crate::pipeline::conversation::{Conversation, Part, Turn};
use crate::pipeline::llm::{Attachment, ModelBackend, Reply};
use crate::pipeline::merge::merge_records;
use crate::pipeline::sanitize::{is_empty_array, sanitize_reply, EMPTY_ARRAY};
use crate::pipeline::units::DocumentUnit;
use crate::prompts::{correction_message, CorrectionPass, EXTRACTION_PROMPT};
use crate::record::Record;
use crate::reference::AddressReference;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle of one unit, logged at every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Init,
    Extracting,
    Correcting,
    Merging,
    Done,
    Failed,
    Cleanup,
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitState::Init => "init",
            UnitState::Extracting => "extracting",
            UnitState::Correcting => "correcting",
            UnitState::Merging => "merging",
            UnitState::Done => "done",
            UnitState::Failed => "failed",
            UnitState::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// Call bookkeeping shared by the stages of one unit.
struct UnitRun<'a, B> {
    backend: &'a B,
    unit: &'a DocumentUnit,
    conversation: Conversation,
    state: UnitState,
    calls: usize,
    input_tokens: u64,
    output_tokens: u64,
}

impl<'a, B: ModelBackend> UnitRun<'a, B> {
    fn enter(&mut self, next: UnitState) {
        debug!("Unit {}: {} → {}", self.unit.position, self.state, next);
        self.state = next;
    }

    /// Send one turn; on success the exchange joins the conversation.
    async fn call(&mut self, turn: Turn) -> Result<Reply, String> {
        self.calls += 1;
        let reply = self
            .backend
            .send(&self.conversation, &turn)
            .await
            .map_err(|e| e.to_string())?;
        self.input_tokens += reply.input_tokens;
        self.output_tokens += reply.output_tokens;
        self.conversation.record(turn, &reply.text);
        Ok(reply)
    }
}

/// Run the full pipeline for one unit. Never fails: problems are reported
/// in [`UnitResult::error`] and the unit contributes no records.
pub async fn process_unit<B: ModelBackend>(
    backend: &B,
    unit: &DocumentUnit,
    reference: &AddressReference,
    config: &ExtractionConfig,
) -> UnitResult {
    let start = Instant::now();
    let mut run = UnitRun {
        backend,
        unit,
        conversation: Conversation::new(),
        state: UnitState::Init,
        calls: 0,
        input_tokens: 0,
        output_tokens: 0,
    };

    let outcome = match backend.upload(unit).await {
        Ok(attachment) => {
            let outcome = extract_and_correct(&mut run, &attachment, reference, config).await;
            run.enter(if outcome.is_ok() {
                UnitState::Done
            } else {
                UnitState::Failed
            });
            run.enter(UnitState::Cleanup);
            if let Err(e) = backend.release(&attachment).await {
                warn!("Unit {}: could not release {}: {}", unit.position, attachment.id, e);
            }
            outcome
        }
        Err(e) => {
            run.enter(UnitState::Failed);
            Err(UnitError::UploadFailed {
                position: unit.position,
                detail: e.to_string(),
            })
        }
    };

    let (records, error) = match outcome {
        Ok(records) => {
            info!(
                "Unit {} ({}): {} record(s) after {} call(s)",
                unit.position,
                unit.label,
                records.len(),
                run.calls
            );
            (records, None)
        }
        Err(e) => {
            warn!("{}", e);
            (Vec::new(), Some(e))
        }
    };

    UnitResult {
        position: unit.position,
        label: unit.label.clone(),
        records,
        calls: run.calls,
        input_tokens: run.input_tokens,
        output_tokens: run.output_tokens,
        duration_ms: start.elapsed().as_millis() as u64,
        error,
    }
}

async fn extract_and_correct<B: ModelBackend>(
    run: &mut UnitRun<'_, B>,
    attachment: &Attachment,
    reference: &AddressReference,
    config: &ExtractionConfig,
) -> Result<Vec<Record>, UnitError> {
    let position = run.unit.position;

    run.enter(UnitState::Extracting);
    let base_turn = Turn::user(vec![
        Part::Text(EXTRACTION_PROMPT.to_string()),
        Part::Text(reference.text().to_string()),
        Part::Attachment(attachment.id.clone()),
    ]);
    let reply = run
        .call(base_turn)
        .await
        .map_err(|detail| UnitError::ExtractionCallFailed { position, detail })?;

    if reply.text.trim().is_empty() {
        return Err(UnitError::EmptyReply { position });
    }
    let base = sanitize_reply(Some(reply.text.as_str()));
    if is_empty_array(&base) {
        return Err(UnitError::ExtractionFailed {
            position,
            raw_reply: reply.text,
        });
    }

    run.enter(UnitState::Correcting);
    let mut patches = Vec::with_capacity(CorrectionPass::ORDER.len());
    for pass in CorrectionPass::ORDER {
        let mut parts = vec![Part::Text(correction_message(&base, pass, config.default_year))];
        if pass.needs_reference() {
            parts.push(Part::Text(reference.text().to_string()));
        }

        let patch = match run.call(Turn::user(parts)).await {
            Ok(reply) => sanitize_reply(Some(reply.text.as_str())),
            Err(e) => {
                warn!("Unit {}: {} pass failed, no corrections applied: {}", position, pass, e);
                EMPTY_ARRAY.to_string()
            }
        };
        debug!("Unit {}: {} pass → {} bytes", position, pass, patch.len());
        patches.push(patch);

        if let Some(cb) = &config.progress_callback {
            cb.on_pass_complete(position, pass);
        }
    }

    run.enter(UnitState::Merging);
    merge_records(&base, &patches).map_err(|e| UnitError::MergeFailed {
        position,
        detail: e.to_string(),
        raw_base: base.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::pipeline::conversation::Role;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies are consumed in call order; `None` makes the call fail.
    struct Scripted {
        replies: Mutex<VecDeque<Option<&'static str>>>,
        histories: Mutex<Vec<usize>>,
        released: Mutex<usize>,
    }

    impl Scripted {
        fn new(replies: Vec<Option<&'static str>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                histories: Mutex::new(Vec::new()),
                released: Mutex::new(0),
            }
        }
    }

    impl ModelBackend for Scripted {
        async fn upload(&self, unit: &DocumentUnit) -> Result<Attachment, BackendError> {
            Ok(Attachment {
                id: "a1".into(),
                label: unit.label.clone(),
            })
        }

        async fn send(&self, history: &Conversation, turn: &Turn) -> Result<Reply, BackendError> {
            assert_eq!(turn.role, Role::User);
            self.histories.lock().unwrap().push(history.len());
            match self.replies.lock().unwrap().pop_front().flatten() {
                Some(text) => Ok(Reply::text(text)),
                None => Err(BackendError::Call {
                    retries: 0,
                    detail: "boom".into(),
                }),
            }
        }

        async fn release(&self, _attachment: &Attachment) -> Result<(), BackendError> {
            *self.released.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn unit() -> DocumentUnit {
        DocumentUnit {
            position: 4,
            label: "scan.jpg".into(),
            mime_type: "image/jpeg",
            bytes: vec![1, 2, 3],
        }
    }

    fn reference() -> AddressReference {
        AddressReference::from_json_str(r#"["SIDOHARJO"]"#).unwrap()
    }

    #[tokio::test]
    async fn failed_pass_degrades_to_no_corrections() {
        let backend = Scripted::new(vec![
            Some(r#"[{"No":"1","Nama Pasien":"SRI","Diagnosa":"ademponan"}]"#),
            None,
            Some("[]"),
            Some("[]"),
            Some(r#"[{"No":"1","Diagnosa":"adem panas"}]"#),
        ]);
        let result = process_unit(&backend, &unit(), &reference(), &ExtractionConfig::default()).await;

        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(result.calls, 5);
        assert_eq!(result.records[0].diagnosis.as_deref(), Some("adem panas"));
        // the failed exchange is not part of the history
        assert_eq!(*backend.histories.lock().unwrap(), vec![0, 2, 2, 4, 6]);
        assert_eq!(*backend.released.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_base_call_issues_no_corrections() {
        let backend = Scripted::new(vec![None]);
        let result = process_unit(&backend, &unit(), &reference(), &ExtractionConfig::default()).await;
        assert_eq!(result.calls, 1);
        assert!(matches!(
            result.error,
            Some(UnitError::ExtractionCallFailed { position: 4, .. })
        ));
        assert_eq!(*backend.released.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn prose_reply_is_an_extraction_failure() {
        let backend = Scripted::new(vec![Some("Maaf, gambar tidak terbaca.")]);
        let result = process_unit(&backend, &unit(), &reference(), &ExtractionConfig::default()).await;
        match result.error {
            Some(UnitError::ExtractionFailed { raw_reply, .. }) => {
                assert_eq!(raw_reply, "Maaf, gambar tidak terbaca.")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(result.records.is_empty());
    }

    #[tokio::test]
    async fn invalid_base_element_fails_the_merge() {
        let backend = Scripted::new(vec![
            Some(r#"[{"No":"1"}, 5]"#),
            Some("[]"),
            Some("[]"),
            Some("[]"),
            Some("[]"),
        ]);
        let result = process_unit(&backend, &unit(), &reference(), &ExtractionConfig::default()).await;
        match result.error {
            Some(UnitError::MergeFailed { raw_base, .. }) => assert_eq!(raw_base, r#"[{"No":"1"}, 5]"#),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(*backend.released.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn whitespace_empty_array_is_an_extraction_failure() {
        for raw in ["[ ]", "```json\n[\n]\n```"] {
            let backend = Scripted::new(vec![Some(raw)]);
            let result =
                process_unit(&backend, &unit(), &reference(), &ExtractionConfig::default()).await;
            assert_eq!(result.calls, 1, "{raw:?} must not reach the correction passes");
            match result.error {
                Some(UnitError::ExtractionFailed { raw_reply, .. }) => assert_eq!(raw_reply, raw),
                other => panic!("unexpected {other:?}"),
            }
            assert_eq!(*backend.released.lock().unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn list_valued_medication_keeps_every_record() {
        let backend = Scripted::new(vec![
            Some(
                r#"[{"No":"1","Nama Pasien":"SRI","Obat/Tindakan":["Paracetamol","CTM"]},
                    {"No":"2","Nama Pasien":"TONO","NIK":"331","Nomor Induk Kependudukan (NIK)":"331"}]"#,
            ),
            Some("[]"),
            Some(r#"[{"No":"2","Nama Pasien":"TONO SUDARMO"}]"#),
            Some("[]"),
            Some("[]"),
        ]);
        let result = process_unit(&backend, &unit(), &reference(), &ExtractionConfig::default()).await;

        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].treatment.as_deref(), Some("Paracetamol, CTM"));
        assert_eq!(result.records[1].name.as_deref(), Some("TONO SUDARMO"));
        assert_eq!(result.records[1].nik.as_deref(), Some("331"));
    }

    #[test]
    fn state_display() {
        assert_eq!(UnitState::Correcting.to_string(), "correcting");
    }
}
