//! The driving loop: fragments in, at most one registration out.
use chrono::{DateTime, FixedOffset, NaiveDate};
use promo_calendar::{EventRegistration, Ledger, LedgerSession, Registrar, RegistrationReceipt};
use promo_common::{MarkerScope, PromoError, StopPolicy};
use promo_social::{EventDetector, FragmentSource, Pairer};

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub scope: MarkerScope,
    pub stop_policy: StopPolicy,
    /// Upper bound on fragments read; `0` means no bound.
    pub max_fragments: usize,
    pub now: DateTime<FixedOffset>,
    pub title: String,
    pub dry_run: bool,
}

impl ScanOptions {
    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Registered(RegistrationReceipt),
    AlreadyRegistered { tail: String },
    /// Dry run: the ledger would have accepted it.
    WouldRegister,
    /// Announced for a day before today; never registered.
    Passed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventResult {
    pub date: NaiveDate,
    pub outcome: EventOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    FirstEvent,
    EventPassed,
    Exhausted,
    FragmentLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub fragments: usize,
    pub messages: usize,
    pub events: Vec<EventResult>,
    pub stop: StopReason,
}

impl ScanReport {
    pub fn registered(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.outcome, EventOutcome::Registered(_)))
            .count()
    }
}

/// Fold `source` through pairing and detection, applying ledger and registrar.
///
/// `registrar` may be `None` only for dry runs. The ledger file is opened on
/// the first upcoming event and closed when the scan returns.
pub async fn run_scan(
    source: &mut dyn FragmentSource,
    detector: &EventDetector,
    ledger: &Ledger,
    mut registrar: Option<&mut dyn Registrar>,
    options: &ScanOptions,
) -> Result<ScanReport, PromoError> {
    let today = options.today();
    let mut pairer = Pairer::new(options.scope, options.now);
    let mut session: Option<LedgerSession> = None;
    let mut events = Vec::new();
    let mut fragments = 0usize;
    let mut messages = 0usize;

    tracing::info!(
        source = source.name(),
        keyword = detector.keyword(),
        %today,
        dry_run = options.dry_run,
        "scan.start"
    );

    let stop = loop {
        if options.max_fragments > 0 && fragments >= options.max_fragments {
            break StopReason::FragmentLimit;
        }
        let Some(fragment) = source.next_fragment().await? else {
            break StopReason::Exhausted;
        };
        fragments += 1;
        tracing::debug!(index = fragments, chars = fragment.chars().count(), "scan.fragment");

        let Some(message) = pairer.push(&fragment) else {
            continue;
        };
        messages += 1;

        let announcement = match detector.infer(&message) {
            Ok(Some(found)) => found,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(error = %err, posted = %message.marker.date(), "scan.event.invalid_date");
                continue;
            }
        };
        let date = announcement.date;
        tracing::info!(%date, posted = %message.marker.date(), "scan.event");

        if date < today {
            tracing::info!(%date, %today, "scan.event.passed");
            events.push(EventResult {
                date,
                outcome: EventOutcome::Passed,
            });
            break StopReason::EventPassed;
        }

        let open = match &mut session {
            Some(open) => open,
            None => session.insert(ledger.open().map_err(|e| PromoError::Ledger(e.to_string()))?),
        };
        let outcome = apply(
            open,
            registrar.as_mut().map(|r| &mut **r as &mut dyn Registrar),
            date,
            options,
        )
        .await?;
        events.push(EventResult { date, outcome });

        if options.stop_policy == StopPolicy::FirstEvent {
            break StopReason::FirstEvent;
        }
    };

    drop(session);
    tracing::info!(fragments, messages, events = events.len(), stop = ?stop, "scan.finish");

    if events.is_empty() {
        return Err(PromoError::NoEventFound { fragments });
    }
    Ok(ScanReport {
        fragments,
        messages,
        events,
        stop,
    })
}

async fn apply(
    session: &mut LedgerSession,
    registrar: Option<&mut dyn Registrar>,
    date: NaiveDate,
    options: &ScanOptions,
) -> Result<EventOutcome, PromoError> {
    if !session.should_register(date) {
        tracing::info!(%date, tail = session.tail(), "scan.event.already_registered");
        return Ok(EventOutcome::AlreadyRegistered {
            tail: session.tail().to_string(),
        });
    }
    if options.dry_run {
        tracing::info!(%date, "scan.event.dry_run");
        return Ok(EventOutcome::WouldRegister);
    }
    let registrar = registrar
        .ok_or_else(|| PromoError::Config("no registrar configured for a live run".into()))?;

    let registration = EventRegistration {
        title: options.title.clone(),
        date,
    };
    let receipt = registrar
        .register(&registration)
        .await
        .map_err(|e| PromoError::Registration(format!("{}: {e}", registrar.name())))?;
    session
        .append(date)
        .map_err(|e| PromoError::Ledger(e.to_string()))?;
    tracing::info!(%date, registrar = registrar.name(), "scan.event.registered");
    Ok(EventOutcome::Registered(receipt))
}
