use photo_describe::{AiConfig, PhotoInput, ProviderFactory};
use std::env;
use std::path::Path;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("Usage: photo-describe <image>...");
        eprintln!("       photo-describe --test-connection");
        std::process::exit(2);
    }

    let config = AiConfig::load()?;
    let factory = ProviderFactory::new(config);

    if args[0] == "--test-connection" {
        let (ok, message) = factory.test_connection().await;
        println!("{}: {}", factory.current_provider(), message);
        std::process::exit(if ok { 0 } else { 1 });
    }

    let mut photos = Vec::with_capacity(args.len());
    let mut names = Vec::with_capacity(args.len());
    for path in &args {
        let bytes = tokio::fs::read(path).await?;
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        names.push(name.clone());
        photos.push(PhotoInput::new(name, bytes));
    }

    let total = photos.len();
    let mut handle = factory.analyze_batch(photos)?;
    let mut failures = 0usize;

    // Results arrive in completion order; the index ties them back to the
    // submitted file
    while let Some((index, result)) = handle.next().await {
        let name = &names[index];
        if result.is_success() {
            let keywords = result
                .keywords
                .iter()
                .map(|k| k.description.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            println!("{name}");
            println!("  title:    {}", result.title);
            println!("  caption:  {}", result.caption);
            if !result.location.is_empty() {
                println!("  location: {}", result.location);
            }
            println!("  keywords: {keywords}");
        } else {
            failures += 1;
            println!("{name}");
            println!(
                "  error: {}",
                result.error_message.as_deref().unwrap_or("unknown error")
            );
        }
    }

    println!("batch complete: {} succeeded, {} failed", total - failures, failures);
    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
