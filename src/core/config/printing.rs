use crate::core::config::data::Config;

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        println!("  base-url: {}", self.base_url());
        println!("  model: {}", self.model());
        println!("  api-key-env: {}", self.api_key_env());
        println!("  request-timeout: {}s", self.request_timeout().as_secs());
        println!("  session-timeout: {}s", self.session_timeout().as_secs());
        println!("  summary-images: {}", self.image_policy());
        match self.persist_images() {
            true => println!("  persist-images: on ({})", self.output_dir().display()),
            false => println!("  persist-images: off"),
        }
        match &self.default_server {
            Some(server) => println!("  default-server: {server}"),
            None => println!("  default-server: (unset)"),
        }
        if self.servers.is_empty() {
            println!("  servers: (none configured)");
        } else {
            println!("  servers:");
            for server in &self.servers {
                let state = if server.is_enabled() { "" } else { " (disabled)" };
                println!("    {}: {}{state}", server.id, server.launch_spec().display());
            }
        }
    }
}
