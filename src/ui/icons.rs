pub struct Icons;

impl Icons {
    pub const SATELLITE: &str = "🛰️";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const STATS: &str = "📊";
    pub const DATABASE: &str = "🗄️";
    pub const FOLDER: &str = "📁";
    pub const KEY: &str = "🔑";
}
