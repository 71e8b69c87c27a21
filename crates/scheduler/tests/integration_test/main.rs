/// Integration tests for the detection scheduler covering end-to-end
/// week-over-week runs, task failure isolation, merging across runs,
/// retention, backfill and the trigger loops.

mod backfill;
mod end_to_end;
mod helpers;
mod merging;
mod retention;
mod store_failures;
mod streams;
