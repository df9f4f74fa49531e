use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = cohort_api::Args::parse();
	cohort_api::run(args).await
}
