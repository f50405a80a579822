//! Plain-text rendering of draft state, grouped into sections.

use std::collections::BTreeSet;
use std::io::{self, Write};

use chrono::{DateTime, Utc};
use ratedesk_core::{DraftSlice, FacilityId, Saved};

use crate::session::SessionDomain;

/// Print unsaved and saved changes, optionally for one facility only.
pub fn print_status<T: SessionDomain>(
    out: &mut impl Write,
    slice: &DraftSlice<T>,
    facility: Option<FacilityId>,
    last_published: Option<DateTime<Utc>>,
) -> io::Result<()> {
    let facilities: BTreeSet<FacilityId> = match facility {
        Some(id) => BTreeSet::from([id]),
        None => slice
            .changed_facilities()
            .iter()
            .map(|c| c.facility_id)
            .chain(slice.saved_changes().iter().map(|s| s.facility_id()))
            .collect(),
    };

    writeln!(out, "=== {} ===", T::DOMAIN)?;
    writeln!(out, "  {:<26} {}", "unsaved", slice.unsaved_count())?;
    writeln!(out, "  {:<26} {}", "saved (ready to publish)", slice.saved_count())?;
    if let Some(ts) = last_published {
        writeln!(out, "  {:<26} {}", "last published", ts.to_rfc3339())?;
    }

    if facilities.is_empty() {
        writeln!(out, "\nNo pending changes.")?;
        return Ok(());
    }

    for id in facilities {
        writeln!(out)?;
        writeln!(out, "Facility {id}")?;

        let unsaved = slice.unsaved_for(id);
        if !unsaved.is_empty() {
            writeln!(out, "  unsaved ({})", slice.pending_count(id))?;
            for draft in unsaved {
                writeln!(out, "    {}  {:?}", draft.entity.describe(), draft.fields)?;
            }
        }

        let saved = slice.saved_for(id);
        if !saved.is_empty() {
            writeln!(out, "  saved ({})", saved.len())?;
            for entry in saved {
                print_saved_line(out, entry)?;
            }
        }
    }
    Ok(())
}

/// Print a durable saved tier as loaded from disk.
pub fn print_saved<T: SessionDomain>(out: &mut impl Write, saved: &[Saved<T>]) -> io::Result<()> {
    writeln!(out, "=== {} ({}) ===", T::storage_key(), saved.len())?;
    for entry in saved {
        print_saved_line(out, entry)?;
    }
    Ok(())
}

fn print_saved_line<T: SessionDomain>(out: &mut impl Write, entry: &Saved<T>) -> io::Result<()> {
    writeln!(
        out,
        "    {}  saved {}",
        entry.entity.describe(),
        entry.saved_at.format("%Y-%m-%d %H:%M:%S")
    )
}
