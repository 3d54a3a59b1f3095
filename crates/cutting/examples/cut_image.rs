use cutting::{
    CancellationToken, DirectorySink, FileSource, FillPolicy, PuzzleCutter, PuzzleJob, Sink,
};
use jigsaw_common::GridSize;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🧩 Jigsaw Cutting Example");

    let input_image = "input.jpg"; // Replace with your image file
    let output_dir = "puzzle_output";

    let source = FileSource::new(input_image);
    let sink = DirectorySink::new(output_dir);

    // Example 1: plain cut at (upscaled) source resolution
    println!("\n✂️  Example 1: 4x6 cut");
    let cutter = PuzzleCutter::builder().build()?;
    let edges = cutter.generate_edges(GridSize::new(4, 6), 2024)?;
    sink.write_shared_text("edges.json", &edges.to_json()?)?;

    let job = PuzzleJob {
        puzzle_id: "plain",
        source: &source,
        requested_pieces: None,
    };
    match cutter.cut(job, &edges, &sink, &CancellationToken::new()) {
        Ok(outcome) => {
            println!("✅ Cut into {} pieces", outcome.metadata.piece_count);
            println!("   Scale factor: {:.2}", outcome.scale_factor);
            println!("   Generated: {}/plain/pieces/piece_*.png", output_dir);
        }
        Err(e) => println!("❌ Error: {}", e),
    }

    // Example 2: same edges, normalized onto 128px canvases
    println!("\n✂️  Example 2: normalized cut");
    let normalizing = PuzzleCutter::builder()
        .with_normalization(128, FillPolicy::Average)
        .build()?;
    let job = PuzzleJob {
        puzzle_id: "normalized",
        source: &source,
        requested_pieces: None,
    };
    match normalizing.cut(job, &edges, &sink, &CancellationToken::new()) {
        Ok(outcome) => {
            if let Some(canvas) = outcome.metadata.canvas {
                println!("✅ Canvas: {}px (margin {}px)", canvas.size, canvas.margin);
            }
            println!("   Generated: {}/normalized/normalized.png", output_dir);
        }
        Err(e) => println!("❌ Error: {}", e),
    }

    println!("\nNote: Make sure you have an image named 'input.jpg' in the current directory");
    println!("      or modify the input_image path in the example.");

    Ok(())
}
