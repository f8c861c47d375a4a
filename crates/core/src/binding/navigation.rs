/// Where the host should go after a page action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Navigation {
    Stay,
    Dashboard,
    Login,
}

impl Navigation {
    pub fn path(&self) -> Option<&'static str> {
        match self {
            Navigation::Stay => None,
            Navigation::Dashboard => Some("/dashboard.html"),
            Navigation::Login => Some("/"),
        }
    }
}
