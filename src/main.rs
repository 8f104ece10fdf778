use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    llmschat::cli::main()
}
