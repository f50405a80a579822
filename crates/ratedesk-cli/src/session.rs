//! Line-oriented editing session over one pricing domain.
//!
//! Each line is one command. Edits stay in memory until `save`; the saved
//! tier lives in the data directory and survives restarts.

use std::io::Write;

use chrono::{TimeDelta, Utc};
use ratedesk_core::{
    Draftable, Facility, FacilityId, RateField, RateUnit, TenantField, TenantRateChange,
};
use ratedesk_store::KeyValueStore;
use ratedesk_sync::{Backend, Notice, Outcome, PublishCoordinator, Publishable};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::display;

/// A parsed edit: which entity, which field, and how to change the snapshot.
pub struct Edit<T: Draftable> {
    pub facility_id: FacilityId,
    pub id: i64,
    pub field: T::Field,
    pub apply: Box<dyn FnOnce(&mut T) + Send>,
}

/// Domain hooks the session needs beyond [`Publishable`].
pub trait SessionDomain: Publishable + Draftable<Id = i64> {
    /// Edit verbs and their arguments, one per line.
    const EDIT_HELP: &'static str;

    /// A snapshot for an entity the session has not seen yet.
    fn blank(id: i64, facility_id: FacilityId) -> Self;

    /// Parse a domain edit command. `None` when `verb` is not an edit verb.
    fn parse_edit(verb: &str, args: &[&str]) -> Option<Result<Edit<Self>, String>>;

    /// One-line summary for listings.
    fn describe(&self) -> String;
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Save(FacilityId),
    Discard(FacilityId),
    Publish(FacilityId),
    PublishAll,
    Refresh,
    Status(Option<FacilityId>),
    Help,
    Quit,
}

/// What a line turned into.
pub enum Line<T: Draftable> {
    Command(Command),
    Edit(Edit<T>),
    Empty,
}

pub fn parse_line<T: SessionDomain>(line: &str) -> Result<Line<T>, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = parts.split_first() else {
        return Ok(Line::Empty);
    };
    let command = match verb {
        "save" => Command::Save(facility_arg(args)?),
        "discard" => Command::Discard(facility_arg(args)?),
        "publish" => Command::Publish(facility_arg(args)?),
        "publish-all" => Command::PublishAll,
        "refresh" => Command::Refresh,
        "status" => match args.first() {
            Some(_) => Command::Status(Some(facility_arg(args)?)),
            None => Command::Status(None),
        },
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => {
            return match T::parse_edit(other, args) {
                Some(edit) => edit.map(Line::Edit),
                None => Err(format!("unknown command {other:?} (try `help`)")),
            };
        }
    };
    Ok(Line::Command(command))
}

fn facility_arg(args: &[&str]) -> Result<FacilityId, String> {
    let raw = args.first().ok_or("missing facility id")?;
    raw.parse()
        .map_err(|_| format!("invalid facility id {raw:?}"))
}

fn int_arg(args: &[&str], idx: usize, name: &str) -> Result<i64, String> {
    let raw = args.get(idx).ok_or_else(|| format!("missing {name}"))?;
    raw.parse().map_err(|_| format!("invalid {name} {raw:?}"))
}

fn rate_arg(args: &[&str], idx: usize, name: &str) -> Result<f64, String> {
    let raw = args.get(idx).ok_or_else(|| format!("missing {name}"))?;
    let rate: f64 = raw
        .trim_start_matches('$')
        .parse()
        .map_err(|_| format!("invalid {name} {raw:?}"))?;
    if !rate.is_finite() || rate < 0.0 {
        return Err(format!("{name} must be a non-negative amount"));
    }
    Ok(rate)
}

fn optional_rate(args: &[&str], idx: usize, name: &str) -> Result<Option<f64>, String> {
    match args.get(idx) {
        Some(_) => rate_arg(args, idx, name).map(Some),
        None => Ok(None),
    }
}

impl SessionDomain for RateUnit {
    const EDIT_HELP: &'static str = "\
  edit-rate <facility> <ut_id> <rate> [current]   propose a new street rate
  lock <facility> <ut_id> [hours]                 lock a unit type (optionally expiring)
  unlock <facility> <ut_id>                       clear a lock
  anchor <facility> <ut_id> <master_ut_id> <pct>  price relative to another unit type";

    fn blank(id: i64, facility_id: FacilityId) -> Self {
        RateUnit::new(id, facility_id, 0.0)
    }

    fn parse_edit(verb: &str, args: &[&str]) -> Option<Result<Edit<Self>, String>> {
        let parsed = match verb {
            "edit-rate" => parse_street_rate(args),
            "lock" => parse_lock(args),
            "unlock" => edit(args, RateField::Locked, |u: &mut RateUnit| {
                u.locked = false;
                u.lock_expiration = None;
            }),
            "anchor" => parse_anchor(args),
            _ => return None,
        };
        Some(parsed)
    }

    fn describe(&self) -> String {
        let mut line = format!(
            "ut {:<8} {:<14} ${:>8.2} -> ${:>8.2}",
            self.ut_id,
            self.unit_type,
            self.std_rate,
            self.effective_rate()
        );
        if self.is_locked_at(Utc::now()) {
            line.push_str("  [locked]");
        } else if self.locked {
            line.push_str("  [lock expired]");
        }
        if let (Some(master), Some(pct)) = (self.master_ut_id, self.adjustment_pct) {
            line.push_str(&format!("  [anchor ut {master} {pct:+}%]"));
        }
        line
    }
}

impl SessionDomain for TenantRateChange {
    const EDIT_HELP: &'static str = "\
  tenant-rate <facility> <ecri_id> <rate> [current]  propose a new tenant rate
  exclude <facility> <ecri_id>                       leave out of the next publish
  include <facility> <ecri_id>                       include in the next publish";

    fn blank(id: i64, facility_id: FacilityId) -> Self {
        TenantRateChange::new(id, facility_id, 0.0)
    }

    fn parse_edit(verb: &str, args: &[&str]) -> Option<Result<Edit<Self>, String>> {
        let parsed = match verb {
            "tenant-rate" => parse_tenant_rate(args),
            "exclude" => edit(args, TenantField::ExcludeSubmit, |c: &mut TenantRateChange| {
                c.exclude_submit = true
            }),
            "include" => edit(args, TenantField::ExcludeSubmit, |c: &mut TenantRateChange| {
                c.exclude_submit = false
            }),
            _ => return None,
        };
        Some(parsed)
    }

    fn describe(&self) -> String {
        let new_rate = self
            .new_rate
            .map_or_else(|| "-".to_string(), |r| format!("${r:.2}"));
        let mut line = format!(
            "ecri {:<6} {:<18} ${:>8.2} -> {:>9}",
            self.ecri_id, self.tenant_name, self.current_rate, new_rate
        );
        if let Some(pct) = self.increase_pct() {
            line.push_str(&format!("  ({:+.1}%)", pct * 100.0));
        }
        if self.exclude_submit {
            line.push_str("  [excluded]");
        }
        line
    }
}

fn parse_street_rate(args: &[&str]) -> Result<Edit<RateUnit>, String> {
    let rate = rate_arg(args, 2, "rate")?;
    let current = optional_rate(args, 3, "current rate")?;
    edit(args, RateField::NewStdRate, move |u: &mut RateUnit| {
        u.new_std_rate = Some(rate);
        if let Some(current) = current {
            u.std_rate = current;
        }
    })
}

fn parse_lock(args: &[&str]) -> Result<Edit<RateUnit>, String> {
    let expires = match args.get(2) {
        Some(_) => {
            let hours = int_arg(args, 2, "hours")?;
            if hours < 0 {
                return Err("hours must not be negative".into());
            }
            let expires = TimeDelta::try_hours(hours)
                .and_then(|lock_for| Utc::now().checked_add_signed(lock_for))
                .ok_or("hours out of range")?;
            Some(expires)
        }
        None => None,
    };
    edit(args, RateField::Locked, move |u: &mut RateUnit| {
        u.locked = true;
        u.lock_expiration = expires;
    })
}

fn parse_anchor(args: &[&str]) -> Result<Edit<RateUnit>, String> {
    let master = int_arg(args, 2, "master ut_id")?;
    let raw = args.get(3).ok_or("missing pct")?;
    let pct: f64 = raw.parse().map_err(|_| format!("invalid pct {raw:?}"))?;
    if !pct.is_finite() {
        return Err(format!("invalid pct {raw:?}"));
    }
    edit(args, RateField::Anchor, move |u: &mut RateUnit| {
        u.master_ut_id = Some(master);
        u.adjustment_pct = Some(pct);
    })
}

fn parse_tenant_rate(args: &[&str]) -> Result<Edit<TenantRateChange>, String> {
    let rate = rate_arg(args, 2, "rate")?;
    let current = optional_rate(args, 3, "current rate")?;
    edit(args, TenantField::NewRate, move |c: &mut TenantRateChange| {
        c.new_rate = Some(rate);
        if let Some(current) = current {
            c.current_rate = current;
        }
    })
}

fn edit<T: Draftable<Id = i64>>(
    args: &[&str],
    field: T::Field,
    apply: impl FnOnce(&mut T) + Send + 'static,
) -> Result<Edit<T>, String> {
    Ok(Edit {
        facility_id: facility_arg(args)?,
        id: int_arg(args, 1, "entity id")?,
        field,
        apply: Box::new(apply),
    })
}

/// Apply an edit on top of the latest known snapshot.
pub fn apply_edit<T, S, B>(coordinator: &PublishCoordinator<T, S, B>, edit: Edit<T>) -> Notice
where
    T: SessionDomain,
    S: KeyValueStore,
    B: Backend,
{
    let Edit {
        facility_id,
        id,
        field,
        apply,
    } = edit;
    let mut entity = coordinator
        .read(|s| s.snapshot(id).cloned())
        .unwrap_or_else(|| T::blank(id, facility_id));
    if entity.facility_id() != facility_id {
        return Notice::error(format!(
            "{} {id} belongs to facility {}, not {facility_id}",
            T::DOMAIN,
            entity.facility_id()
        ));
    }
    apply(&mut entity);
    let summary = entity.describe();
    coordinator.record_edit(facility_id, entity, field);
    let pending = coordinator.read(|s| s.pending_count(facility_id));
    Notice::info(format!(
        "{summary}  (facility {facility_id}: {pending} unsaved)"
    ))
}

/// Run one command. Returns `false` when the session should end.
pub async fn execute<T, S, B>(
    coordinator: &PublishCoordinator<T, S, B>,
    command: Command,
    out: &mut impl Write,
) -> std::io::Result<bool>
where
    T: SessionDomain,
    S: KeyValueStore,
    B: Backend,
{
    let notice = match command {
        Command::Save(id) => report(
            coordinator
                .save_facility_changes(&Facility::new(id, ""))
                .await
                .map(|o| o.map_done(|r| r.notice())),
        ),
        Command::Publish(id) => report(
            coordinator
                .publish_facility(&Facility::new(id, ""))
                .await
                .map(|o| o.map_done(|r| r.notice())),
        ),
        Command::PublishAll => report(
            coordinator
                .publish_all()
                .await
                .map(|o| o.map_done(|r| r.notice())),
        ),
        Command::Discard(id) => {
            let dropped = coordinator.discard_facility(id);
            Notice::info(format!("Discarded {dropped} unsaved change(s) for facility {id}."))
        }
        Command::Refresh => match coordinator.refresh_model().await {
            Ok(()) => Notice::success("Pricing model refreshed; unsaved changes cleared."),
            Err(e) => e.notice(),
        },
        Command::Status(facility) => {
            let last_published = coordinator.last_published();
            coordinator.read(|s| display::print_status(&mut *out, s, facility, last_published))?;
            return Ok(true);
        }
        Command::Help => {
            writeln!(out, "{}", help_text::<T>())?;
            return Ok(true);
        }
        Command::Quit => return Ok(false),
    };
    writeln!(out, "{notice}")?;
    Ok(true)
}

fn report(result: Result<Outcome<Notice>, ratedesk_sync::CoordinatorError>) -> Notice {
    match result {
        Ok(Outcome::Done(notice)) | Ok(Outcome::Nothing(notice)) => notice,
        Err(e) => e.notice(),
    }
}

pub fn help_text<T: SessionDomain>() -> String {
    format!(
        "{} session commands:\n{}\n  \
         save <facility>       send unsaved edits to the server\n  \
         discard <facility>    drop unsaved edits\n  \
         publish <facility>    publish saved changes for one facility\n  \
         publish-all           publish every saved change\n  \
         refresh               rerun the pricing model (drops unsaved edits)\n  \
         status [facility]     show pending and saved changes\n  \
         quit",
        T::DOMAIN,
        T::EDIT_HELP
    )
}

/// Read commands from `input` until EOF or `quit`.
pub async fn run<T, S, B, R>(
    coordinator: &PublishCoordinator<T, S, B>,
    input: R,
    out: &mut impl Write,
) -> anyhow::Result<()>
where
    T: SessionDomain,
    S: KeyValueStore,
    B: Backend,
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    write!(out, "{}> ", T::DOMAIN)?;
    out.flush()?;
    while let Some(line) = lines.next_line().await? {
        match parse_line::<T>(&line) {
            Ok(Line::Empty) => {}
            Ok(Line::Edit(edit)) => writeln!(out, "{}", apply_edit(coordinator, edit))?,
            Ok(Line::Command(command)) => {
                if !execute(coordinator, command, &mut *out).await? {
                    return Ok(());
                }
            }
            Err(e) => writeln!(out, "{}", Notice::error(e))?,
        }
        write!(out, "{}> ", T::DOMAIN)?;
        out.flush()?;
    }
    writeln!(out)?;
    Ok(())
}
