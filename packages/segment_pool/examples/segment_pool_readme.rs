//! Example that demonstrates the basic lifecycle of ranges rented from a `SegmentPool`.
//!
//! This shows renting, resizing, releasing and trimming, with a pool report after each step.

use segment_pool::SegmentPool;

fn main() -> segment_pool::Result<()> {
    println!("=== Segment Pool README Example ===");

    let mut pool = SegmentPool::<u8>::new(32);

    // Renting gives you a token for a range of exactly the requested length.
    let mut header = pool.rent(4);
    header.as_span_mut().copy_from_slice(b"HEAD");

    let mut body = pool.rent(12).enable_clearing(true);
    body.as_span_mut().copy_from_slice(b"hello, world");

    let footer = pool.rent(4);

    println!("{}", pool.report());

    // Growing the header past the active body moves it; the token follows its data.
    header.set_length(8)?;
    println!("Header after growing: {:?}", header.as_span());

    // Releasing the body merges its range with the hole the header left behind. The body had
    // clearing enabled, so only the old header bytes are still visible in the reused range.
    drop(body);
    let reused = pool.rent(6);
    println!("Reused range: {:?}", reused.as_span());

    println!("{}", pool.report());

    drop(footer);
    drop(reused);

    // Compaction moves live ranges to the front and drops segments that are no longer used.
    pool.trim_excess();
    println!("Header after trimming: {:?}", header.try_get_info());

    println!("{}", pool.report());

    println!("README example completed successfully!");

    Ok(())
}
