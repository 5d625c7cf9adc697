use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    toolbridge::cli::main()
}
