/// Router Module Index
///
/// Splits the console's routes by access level. The guard is applied at the
/// module level, so no console view can be mounted without it.

/// Routes reachable without a session: health, session endpoints, and the
/// login and no-access screens.
pub mod public;

/// The authenticated console shell. Every route here carries a declared
/// requirement and runs behind the route guard.
pub mod console;
