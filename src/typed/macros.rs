/// Declare a typed actor interface.
///
/// Generates
///
/// * the implementation trait, with one `async fn` per method taking
///   `self: Rc<Self>` and returning `anyhow::Result<_>`,
/// * a request enum with one variant per method, carrying the arguments,
/// * a proxy that turns method calls into messages to the implementing actor.
///
/// Methods without a return type are fire-and-forget and must be named
/// `send*`; methods with a return type must not be. Both rules are checked at
/// compile time.
///
/// ```ignore
/// typed_actor! {
///     pub trait Greeter, proxy GreeterRef, request GreeterRequest {
///         fn send_note(text: String);
///         fn hello(name: String) -> String;
///     }
/// }
///
/// struct English;
///
/// impl Greeter for English {
///     async fn send_note(self: Rc<Self>, text: String) -> anyhow::Result<()> {
///         println!("{}", text);
///         Ok(())
///     }
///
///     async fn hello(self: Rc<Self>, name: String) -> anyhow::Result<String> {
///         Ok(format!("Hello, {}!", name))
///     }
/// }
///
/// let greeter = GreeterRef::create(&world, "Greeter", English);
/// greeter.send_note("hi".to_owned());
/// let greeting = system.block_on(greeter.hello("you".to_owned()))??;
/// ```
#[macro_export]
macro_rules! typed_actor {
    (
        $(#[$meta:meta])*
        $vis:vis trait $name:ident, proxy $proxy:ident, request $request:ident {
            $(
                $(#[$method_meta:meta])*
                fn $method:ident ( $($arg:ident : $arg_ty:ty),* $(,)? ) $(-> $ret:ty)?;
            )*
        }
    ) => {
        $(#[$meta])*
        #[allow(async_fn_in_trait)]
        $vis trait $name: 'static {
            $(
                $(#[$method_meta])*
                async fn $method(
                    self: ::std::rc::Rc<Self>,
                    $($arg: $arg_ty),*
                ) -> $crate::__private::anyhow::Result<$crate::__typed_actor_return!($($ret)?)>;
            )*
        }

        #[doc = concat!("Requests understood by implementations of `", stringify!($name), "`")]
        #[allow(non_camel_case_types, dead_code)]
        $vis enum $request {
            $(
                #[allow(missing_docs)]
                $method { $($arg: $arg_ty),* },
            )*
        }

        impl<T: $name> $crate::typed::Dispatch<T> for $request {
            fn dispatch(
                self,
                implementation: ::std::rc::Rc<T>,
            ) -> $crate::__private::LocalBoxFuture<
                'static,
                $crate::__private::anyhow::Result<::std::boxed::Box<dyn ::std::any::Any>>,
            > {
                match self {
                    $(
                        $request::$method { $($arg),* } => ::std::boxed::Box::pin(async move {
                            let value = <T as $name>::$method(implementation, $($arg),*).await?;
                            ::std::result::Result::Ok::<_, $crate::__private::anyhow::Error>(
                                ::std::boxed::Box::new(value) as ::std::boxed::Box<dyn ::std::any::Any>,
                            )
                        }),
                    )*
                }
            }
        }

        #[doc = concat!("Proxy to an actor implementing `", stringify!($name), "`")]
        #[derive(Clone, PartialEq, Eq, Debug)]
        $vis struct $proxy {
            target: $crate::ActorRef<$crate::typed::Call>,
        }

        impl $crate::typed::Proxy for $proxy {
            type Request = $request;

            fn from_target(target: $crate::ActorRef<$crate::typed::Call>) -> Self {
                $proxy { target }
            }

            fn target(&self) -> &$crate::ActorRef<$crate::typed::Call> {
                &self.target
            }
        }

        #[allow(dead_code)]
        impl $proxy {
            /// Create an actor running `implementation`
            pub fn create<T: $name>(world: &$crate::World, name: &str, implementation: T) -> Self {
                world.create_typed::<Self, T>(name, implementation, false)
            }

            /// Create an actor running `implementation` whose method invocations may overlap
            pub fn create_interleaved<T: $name>(
                world: &$crate::World,
                name: &str,
                implementation: T,
            ) -> Self {
                world.create_typed::<Self, T>(name, implementation, true)
            }

            $(
                $crate::__typed_actor_method! {
                    [$(#[$method_meta])*] $request, $method, ($($arg: $arg_ty),*), [$($ret)?]
                }
            )*
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __typed_actor_return {
    () => { () };
    ($ret:ty) => { $ret };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __typed_actor_method {
    ([$(#[$meta:meta])*] $request:ident, $method:ident, ($($arg:ident : $arg_ty:ty),*), []) => {
        $(#[$meta])*
        pub fn $method(&self, $($arg: $arg_ty),*) {
            const _: () = assert!(
                $crate::typed::is_fire_and_forget(stringify!($method)),
                "methods without a return type must be named send*"
            );
            $crate::typed::fire(&self.target, stringify!($method), $request::$method { $($arg),* });
        }
    };
    ([$(#[$meta:meta])*] $request:ident, $method:ident, ($($arg:ident : $arg_ty:ty),*), [$ret:ty]) => {
        $(#[$meta])*
        pub fn $method(&self, $($arg: $arg_ty),*) -> $crate::typed::Reply<$ret> {
            const _: () = assert!(
                !$crate::typed::is_fire_and_forget(stringify!($method)),
                "send* methods must not return a value"
            );
            $crate::typed::call(&self.target, stringify!($method), $request::$method { $($arg),* })
        }
    };
}
