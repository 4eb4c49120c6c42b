use std::sync::Arc;

use collect_core::model::{AnswerRecord, CollectionProgress, NavigationState, PersonalityCode};
use collect_core::{Clock, NavigationHistory, Position, ProgressInfo, Schedule};
use storage::ProgressStore;
use tracing::{info, warn};

use crate::archive::ArchivalService;
use crate::conversation::ConversationService;
use crate::error::CollectionError;
use crate::export::{ExportOptions, ExportPipeline, LocalExport};
use crate::sync::SessionSynchronizer;

/// What happened after an accepted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStep {
    /// The next question of the same phase is active.
    Asked,
    /// The phase was closed and uploaded; `phase` is now active.
    PhaseStarted { phase: u32 },
    /// The phase was closed and uploaded, but `phase` could not be opened.
    /// The answer is recorded; [`CollectionFlow::retry_phase`] opens it.
    PhasePending { phase: u32 },
    /// The last phase was closed. `uploaded` reports whether the full dataset
    /// reached the archive.
    Finished { uploaded: bool },
}

/// Collaborators a `CollectionFlow` talks to.
#[derive(Clone)]
pub struct FlowServices {
    pub conversation: Arc<dyn ConversationService>,
    pub archive: Arc<dyn ArchivalService>,
    pub store: ProgressStore,
}

/// Drives a participant through the schedule.
///
/// Owns the persisted progress and the current phase's navigation history.
/// `collected_data` always equals the answers of finished phases followed by
/// the answers visible at the history cursor, so moving back and answering
/// again never duplicates records.
pub struct CollectionFlow {
    schedule: Schedule,
    clock: Clock,
    sync: SessionSynchronizer,
    store: ProgressStore,
    export: ExportPipeline,
    progress: Option<CollectionProgress>,
    history: NavigationHistory,
}

impl CollectionFlow {
    #[must_use]
    pub fn new(services: FlowServices) -> Self {
        let schedule = Schedule::standard();
        Self {
            export: ExportPipeline::new(schedule.clone(), services.archive),
            schedule,
            clock: Clock::default_clock(),
            sync: SessionSynchronizer::new(services.conversation),
            store: services.store,
            progress: None,
            history: NavigationHistory::new(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self.export = self.export.with_clock(clock);
        self
    }

    #[must_use]
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.export = self.export.with_schedule(schedule.clone());
        self.schedule = schedule;
        self
    }

    #[must_use]
    pub fn with_export_options(mut self, options: ExportOptions) -> Self {
        self.export = self.export.with_options(options);
        self
    }

    #[must_use]
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    #[must_use]
    pub fn progress(&self) -> Option<&CollectionProgress> {
        self.progress.as_ref()
    }

    #[must_use]
    pub fn history(&self) -> &NavigationHistory {
        &self.history
    }

    #[must_use]
    pub fn synchronizer(&self) -> &SessionSynchronizer {
        &self.sync
    }

    /// State shown to the participant right now.
    #[must_use]
    pub fn current(&self) -> Option<&NavigationState> {
        self.history.current()
    }

    /// True when the current phase has an open remote session to answer into.
    #[must_use]
    pub fn is_phase_open(&self) -> bool {
        !self.history.is_empty()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.progress
            .as_ref()
            .is_some_and(|progress| self.schedule.is_complete(progress.current_phase))
    }

    #[must_use]
    pub fn progress_info(&self) -> Option<ProgressInfo> {
        let progress = self.progress.as_ref()?;
        if self.schedule.is_complete(progress.current_phase) {
            return None;
        }
        let answered = self
            .current()
            .map_or(0, |state| state.session_data().len());
        Some(
            self.schedule
                .progress_info(progress.current_phase, u32::try_from(answered).unwrap_or(u32::MAX)),
        )
    }

    /// Start a fresh run at phase 1 and open its first question.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::Storage` if the initial save fails and
    /// `CollectionError::Sync` if the remote session cannot be opened. In the
    /// latter case the run is saved and [`retry_phase`](Self::retry_phase)
    /// opens the phase later.
    pub async fn begin(
        &mut self,
        participant_name: &str,
        personality_code: Option<PersonalityCode>,
    ) -> Result<&NavigationState, CollectionError> {
        if let Some(code) = &personality_code {
            if !code.is_well_formed(&self.schedule) {
                warn!(code = %code, "personality code does not match the element letter pairs");
            }
        }
        let progress = CollectionProgress::new(participant_name, personality_code);
        self.store.save(&progress).await?;
        info!(participant = progress.display_name(), "collection started");
        self.progress = Some(progress);
        self.enter_phase().await
    }

    /// Restore a saved run. Answers of the interrupted phase are dropped and
    /// that phase restarts from its first question.
    ///
    /// Returns `false` when nothing was saved.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::Sync` if the restarted phase cannot be opened;
    /// the progress stays loaded and [`retry_phase`](Self::retry_phase) applies.
    pub async fn resume(&mut self) -> Result<bool, CollectionError> {
        let Some(mut progress) = self.store.restore().await else {
            return Ok(false);
        };
        progress.discard_current_phase();
        info!(
            participant = progress.display_name(),
            phase = progress.current_phase,
            records = progress.collected_data.len(),
            "collection resumed"
        );
        let finished = self.schedule.is_complete(progress.current_phase);
        self.progress = Some(progress);
        self.history.clear();
        if !finished {
            self.enter_phase().await?;
        }
        Ok(true)
    }

    /// Open the current phase after an earlier attempt failed.
    ///
    /// A phase that is already open is returned as is.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::NotStarted` / `Finished` outside a running
    /// collection and `CollectionError::Sync` if the remote session still
    /// cannot be opened.
    pub async fn retry_phase(&mut self) -> Result<&NavigationState, CollectionError> {
        if self.is_finished() {
            return Err(CollectionError::Finished);
        }
        let phase = self.progress_ref()?.current_phase;
        if self.is_phase_open() {
            return self.current().ok_or(CollectionError::PhaseNotOpen { phase });
        }
        info!(phase, "retrying phase start");
        self.enter_phase().await
    }

    async fn enter_phase(&mut self) -> Result<&NavigationState, CollectionError> {
        let phase = self.progress_ref()?.current_phase;
        let started = self.sync.start(Some(self.schedule.element_id(phase))).await?;
        self.history.clear();
        self.history.push(NavigationState::opening(
            phase,
            started.turn.question,
            started.turn.options,
            Some(started.session_id),
        ));
        self.current().ok_or(CollectionError::NotStarted)
    }

    /// Answer the active question.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::NotStarted` / `Finished` outside a running
    /// collection, `CollectionError::PhaseNotOpen` while the phase awaits
    /// [`retry_phase`](Self::retry_phase), `CollectionError::Sync` if the remote
    /// rejects the answer (local state is unchanged), and
    /// `CollectionError::Storage` if saving progress fails.
    pub async fn answer(&mut self, answer: &str) -> Result<FlowStep, CollectionError> {
        if self.is_finished() {
            return Err(CollectionError::Finished);
        }
        self.require_open_phase()?;
        let progress = self.progress_ref()?;
        let schedule = &self.schedule;
        let participant = progress.display_name().to_owned();
        let timestamp = self.clock.now();

        self.sync
            .advance(&mut self.history, answer, |current, turn| {
                let record = AnswerRecord {
                    participant_name: participant,
                    phase: current.phase(),
                    element_type: schedule.element_type(current.phase()).to_owned(),
                    cycle_number: schedule.cycle(current.phase()),
                    question_number_in_phase: current.question_in_phase(),
                    question: current.question().to_owned(),
                    answer: answer.trim().to_owned(),
                    timestamp,
                    session_id: current.session_id().cloned(),
                };
                current.follow_up(record, turn.question, turn.options)
            })
            .await?;
        self.sync_collected_data();

        let answered = self.current().map_or(0, |state| state.session_data().len());
        if answered >= self.schedule.questions_per_phase() as usize {
            return self.finish_phase().await;
        }
        self.store.save(self.progress_ref()?).await?;
        Ok(FlowStep::Asked)
    }

    async fn finish_phase(&mut self) -> Result<FlowStep, CollectionError> {
        if let Err(err) = self.sync.complete().await {
            // the next start closes it again
            warn!(error = %err, "could not complete remote session");
        }

        let progress = self.progress.as_mut().ok_or(CollectionError::NotStarted)?;
        let phase = progress.current_phase;
        let records = progress.phase_records(phase);
        if let Err(err) = self
            .export
            .export_phase(
                &records,
                phase,
                progress.display_name(),
                progress.personality_code.as_ref(),
            )
            .await
        {
            warn!(phase, error = %err, "phase upload failed; data kept locally");
        }

        progress.current_phase += 1;
        self.history.clear();
        self.store.save(progress).await?;
        info!(completed = phase, next = progress.current_phase, "phase completed");

        if self.schedule.is_complete(progress.current_phase) {
            let uploaded = self.upload_all().await;
            return Ok(FlowStep::Finished { uploaded });
        }

        let next = progress.current_phase;
        match self.enter_phase().await {
            Ok(_) => Ok(FlowStep::PhaseStarted { phase: next }),
            Err(CollectionError::Sync(err)) => {
                warn!(phase = next, error = %err, "could not open next phase");
                Ok(FlowStep::PhasePending { phase: next })
            }
            Err(err) => Err(err),
        }
    }

    /// Upload the full dataset and, on success, clear the saved progress.
    pub async fn upload_all(&mut self) -> bool {
        let Some(progress) = self.progress.as_ref() else {
            return false;
        };
        let uploaded = self
            .export
            .export_all(
                &progress.collected_data,
                progress.display_name(),
                progress.personality_code.as_ref(),
            )
            .await;
        if uploaded {
            if let Err(err) = self.store.clear().await {
                warn!(error = %err, "could not clear saved progress after upload");
            }
        }
        uploaded
    }

    /// Go back one question within the current phase.
    ///
    /// Returns `None` at the phase's first question; earlier phases are closed.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::PhaseNotOpen` before the phase is open and
    /// `CollectionError::Sync` if the remote undo fails (local state is unchanged).
    pub async fn back(&mut self) -> Result<Option<&NavigationState>, CollectionError> {
        self.require_open_phase()?;
        if self.history.steps_behind() == 0 {
            return Ok(None);
        }
        self.sync.rewind(&mut self.history, 1).await?;
        self.sync_collected_data();
        Ok(self.history.current())
    }

    /// Go forward to a question answered before moving back.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::PhaseNotOpen` before the phase is open and
    /// `CollectionError::Sync` if resubmitting the stored answer fails.
    pub async fn forward(&mut self) -> Result<Option<&NavigationState>, CollectionError> {
        self.require_open_phase()?;
        if !self.history.can_go_forward() {
            return Ok(None);
        }
        self.sync.replay(&mut self.history).await?;
        self.sync_collected_data();
        Ok(self.history.current())
    }

    #[must_use]
    pub fn can_go_back(&self) -> bool {
        let Some(state) = self.current() else {
            return false;
        };
        self.history.can_go_back(Position {
            phase: state.phase(),
            question_in_phase: state.question_in_phase(),
        })
    }

    #[must_use]
    pub fn can_go_forward(&self) -> bool {
        self.history.can_go_forward()
    }

    /// Persist the current progress.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::NotStarted` without progress and
    /// `CollectionError::Storage` if the save fails.
    pub async fn pause(&self) -> Result<(), CollectionError> {
        let progress = self.progress_ref()?;
        self.store.save(progress).await?;
        info!(
            phase = progress.current_phase,
            records = progress.collected_data.len(),
            "collection paused"
        );
        Ok(())
    }

    /// Abandon the run: close the remote session, forget local state and the save.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::Storage` if the saved progress cannot be removed.
    pub async fn reset(&mut self) -> Result<(), CollectionError> {
        if let Err(err) = self.sync.complete().await {
            warn!(error = %err, "could not complete remote session during reset");
        }
        self.history.clear();
        self.progress = None;
        self.store.clear().await?;
        info!("collection reset");
        Ok(())
    }

    /// Full CSV of everything collected so far.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::NotStarted` without progress.
    pub fn export_local(&self) -> Result<LocalExport, CollectionError> {
        let progress = self.progress_ref()?;
        Ok(self.export.export_full(
            &progress.collected_data,
            progress.display_name(),
            progress.personality_code.as_ref(),
        ))
    }

    fn progress_ref(&self) -> Result<&CollectionProgress, CollectionError> {
        self.progress.as_ref().ok_or(CollectionError::NotStarted)
    }

    fn require_open_phase(&self) -> Result<(), CollectionError> {
        let phase = self.progress_ref()?.current_phase;
        if self.is_phase_open() {
            Ok(())
        } else {
            Err(CollectionError::PhaseNotOpen { phase })
        }
    }

    fn sync_collected_data(&mut self) {
        let Some(progress) = self.progress.as_mut() else {
            return;
        };
        let offset = progress.current_phase_offset();
        progress.collected_data.truncate(offset);
        if let Some(state) = self.history.current() {
            progress
                .collected_data
                .extend(state.session_data().iter().cloned());
        }
    }
}
