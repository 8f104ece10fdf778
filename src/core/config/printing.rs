use crate::core::config::data::Config;

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        match &self.database_path {
            Some(path) => println!("  database-path: {}", path.display()),
            None => println!("  database-path: (default)"),
        }
        println!("  greeting: {}", self.greeting());
        println!("  stream-buffer: {}", self.stream_buffer());
        println!("  request-timeout: {}s", self.request_timeout().as_secs());
        println!("  max-tokens: {}", self.max_tokens());
        match &self.log_filter {
            Some(filter) => println!("  log-filter: {filter}"),
            None => println!("  log-filter: (unset)"),
        }
        if self.base_urls.is_empty() {
            println!("  base-urls: (none set)");
        } else {
            println!("  base-urls:");
            for (provider, url) in &self.base_urls {
                println!("    {provider}: {url}");
            }
        }
    }
}
